//! Core traits for the journal backend.
//!
//! These traits define the interfaces the ingestion pipeline calls, so the
//! relational store, vector index and model providers can be swapped (for
//! example for in-memory fixtures in tests).

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    AudioChunk, ChunkContext, EmbeddingMatch, EmbeddingRecord, EntryAnalysis, EntryPage,
    JournalChunk, JournalEntry, ListEntriesRequest, NewAudioChunk, Result, TextChunk,
    UpdateEntryRequest, User,
};

// =============================================================================
// IDENTITY
// =============================================================================

/// Repository for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Return the single default user, creating it with placeholder
    /// credentials if absent. Idempotent.
    async fn ensure_default_user(&self) -> Result<User>;

    /// Fetch a user by ID.
    async fn fetch(&self, id: Uuid) -> Result<User>;
}

/// Resolves the user on whose behalf a request runs.
#[async_trait]
pub trait CurrentUserProvider: Send + Sync {
    async fn current_user(&self) -> Result<User>;
}

/// Single-user placeholder: every request acts as the default user.
pub struct DefaultUserProvider {
    users: Arc<dyn UserRepository>,
}

impl DefaultUserProvider {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl CurrentUserProvider for DefaultUserProvider {
    async fn current_user(&self) -> Result<User> {
        self.users.ensure_default_user().await
    }
}

// =============================================================================
// ENTRY STORE
// =============================================================================

/// Durable store for entries, audio chunks and text chunks.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Return the entry, creating it owned by `owner_id` with
    /// `initial_content` if absent. No side effect once the entry exists.
    async fn ensure_journal_entry(
        &self,
        entry_id: &str,
        initial_content: &str,
        owner_id: Uuid,
    ) -> Result<JournalEntry>;

    /// Fetch an entry. Fails with `EntryNotFound` if absent.
    async fn fetch(&self, entry_id: &str) -> Result<JournalEntry>;

    /// Check whether an entry exists.
    async fn exists(&self, entry_id: &str) -> Result<bool>;

    /// Partially update an entry and bump `updated_at`.
    /// Fails with `EntryNotFound` if absent.
    async fn update(&self, entry_id: &str, req: UpdateEntryRequest) -> Result<JournalEntry>;

    /// List a user's entries, newest `created_at` first, strictly older than
    /// the cursor when one is given.
    async fn list(&self, user_id: Uuid, req: ListEntriesRequest) -> Result<EntryPage>;

    /// `1 + max(chunk_order)` for the entry, or 0 when it has no audio chunks.
    ///
    /// Informational only; `insert_audio_chunk` assigns the order atomically.
    async fn next_audio_chunk_order(&self, entry_id: &str) -> Result<i32>;

    /// Assign the next order and insert the chunk as one atomic step.
    async fn insert_audio_chunk(&self, chunk: NewAudioChunk) -> Result<AudioChunk>;

    /// Audio chunks of an entry in ascending order.
    async fn list_audio_chunks(&self, entry_id: &str) -> Result<Vec<AudioChunk>>;

    /// Atomically discard every text chunk of the entry and insert `chunks`
    /// with indexes `0..chunks.len()`.
    async fn replace_journal_chunks(
        &self,
        entry_id: &str,
        chunks: &[TextChunk],
    ) -> Result<Vec<JournalChunk>>;

    /// Text chunks of an entry in ascending index order.
    async fn list_journal_chunks(&self, entry_id: &str) -> Result<Vec<JournalChunk>>;

    /// Resolve `(entry_id, chunk_index)` pairs to chunk text plus the parent
    /// entry's creation time. Result order follows `keys`; unknown keys are
    /// skipped.
    async fn fetch_chunk_contexts(&self, keys: &[(String, i32)]) -> Result<Vec<ChunkContext>>;
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<crate::Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Combined inference backend supporting both embedding and generation.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + GenerationBackend {
    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}

/// Derives structured metadata from entry text.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Sentiment, emotions, topics, entities and key points in one result.
    async fn analyze(&self, text: &str) -> Result<EntryAnalysis>;

    /// Key points only, used by on-demand summarization.
    async fn key_points(&self, text: &str) -> Result<Vec<String>>;
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

/// Nearest-neighbour store for chunk embeddings.
///
/// Lifecycle: `init()` must complete before first use. Every other operation
/// on an uninitialized index fails with `Error::Initialization`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the backing collection if absent. Idempotent.
    async fn init(&self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Embed chunks without storing them.
    async fn embed_chunks(
        &self,
        entry_id: &str,
        chunks: &[TextChunk],
    ) -> Result<Vec<EmbeddingRecord>>;

    /// Replace every record of `entry_id` with `records` in one step.
    async fn replace(&self, entry_id: &str, records: Vec<EmbeddingRecord>) -> Result<()>;

    /// Embed and store chunks keyed by `{entryId}-chunk-{index}`, superseding
    /// any previous records of the entry.
    async fn upsert(&self, entry_id: &str, chunks: &[TextChunk]) -> Result<()> {
        let records = self.embed_chunks(entry_id, chunks).await?;
        self.replace(entry_id, records).await
    }

    /// Embed `question` and return the `top_k` most similar records.
    async fn query(&self, question: &str, top_k: usize) -> Result<Vec<EmbeddingMatch>>;
}
