//! # journal-db
//!
//! PostgreSQL storage layer for the journal backend.
//!
//! This crate provides:
//! - Connection pool management
//! - The entry store (users, entries, audio chunks, text chunks)
//! - Fixed-window text chunking
//! - A pgvector embedding index with an explicit `init()` lifecycle
//! - Filesystem blob storage with HMAC-signed retrieval URLs
//!
//! ## Example
//!
//! ```rust,ignore
//! use journal_db::{Database, EntryRepository, PoolConfig, UserRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/journal", &PoolConfig::default()).await?;
//!     db.migrate().await?;
//!
//!     let user = db.users.ensure_default_user().await?;
//!     let entry = db.entries.ensure_journal_entry("2025-01-05", "", user.id).await?;
//!     println!("Entry {} created at {}", entry.id, entry.created_at);
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod embeddings;
pub mod entries;
pub mod file_storage;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so downstream crates' tests can use the in-memory stores
pub mod test_fixtures;

// Re-export core types
pub use journal_core::*;

pub use chunking::{split_into_chunks, Chunker, FixedWindowChunker};
pub use embeddings::PgVectorIndex;
pub use entries::{PgEntryRepository, PgUserRepository};
pub use file_storage::{FilesystemBackend, SignedUrl, StorageBackend, UrlSigner};
pub use pool::{create_pool, PoolConfig};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// User repository.
    pub users: PgUserRepository,
    /// Entry, audio chunk and text chunk repository.
    pub entries: PgEntryRepository,
}

impl Database {
    /// Create a new Database instance from an existing pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            entries: PgEntryRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect to `url` with the given pool settings.
    pub async fn connect(url: &str, config: &PoolConfig) -> Result<Self> {
        let pool = create_pool(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Build the pgvector index over this pool. The index still needs `init()`.
    pub fn vector_index(
        &self,
        embedder: std::sync::Arc<dyn EmbeddingBackend>,
    ) -> PgVectorIndex {
        PgVectorIndex::new(self.pool.clone(), embedder)
    }
}
