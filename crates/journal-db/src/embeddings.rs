//! pgvector-backed embedding index for journal chunks.
//!
//! The index owns the `journal_embedding` table. `init()` creates it (and its
//! HNSW cosine index) if absent with the dimension of the configured embedding
//! backend. Until `init()` succeeds every operation fails with
//! `Error::Initialization`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, info, trace};

use journal_core::{
    build_embedding_records, defaults, EmbeddingBackend, EmbeddingMatch, EmbeddingMetadata,
    EmbeddingRecord, Error, Result, TextChunk, VectorIndex,
};

/// Vector index over `journal_embedding`.
pub struct PgVectorIndex {
    pool: Pool<Postgres>,
    embedder: Arc<dyn EmbeddingBackend>,
    initialized: AtomicBool,
}

impl PgVectorIndex {
    /// Create an uninitialized index. Call [`VectorIndex::init`] before use.
    pub fn new(pool: Pool<Postgres>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            pool,
            embedder,
            initialized: AtomicBool::new(false),
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::Initialization(
                "vector index used before init() completed".to_string(),
            ))
        }
    }

    /// Replace the records of an entry within an existing transaction.
    pub async fn replace_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry_id: &str,
        records: Vec<EmbeddingRecord>,
    ) -> Result<()> {
        self.ensure_initialized()?;

        sqlx::query("DELETE FROM journal_embedding WHERE entry_id = $1")
            .bind(entry_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        for record in records {
            if record.metadata.entry_id != entry_id {
                return Err(Error::InvalidInput(format!(
                    "embedding {} does not belong to entry {}",
                    record.id, entry_id
                )));
            }
            sqlx::query(
                "INSERT INTO journal_embedding
                    (id, entry_id, chunk_index, snippet, start_offset, end_offset, vector, model)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(&record.id)
            .bind(&record.metadata.entry_id)
            .bind(record.metadata.chunk_index)
            .bind(&record.metadata.snippet)
            .bind(record.metadata.start_offset)
            .bind(record.metadata.end_offset)
            .bind(&record.vector)
            .bind(self.embedder.model_name())
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn init(&self) -> Result<()> {
        let dimension = self.embedder.dimension();
        if dimension == 0 {
            return Err(Error::Config("embedding dimension must be positive".into()));
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id           TEXT PRIMARY KEY,
                entry_id     TEXT NOT NULL REFERENCES journal_entry(id) ON DELETE CASCADE,
                chunk_index  INTEGER NOT NULL,
                snippet      TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset   INTEGER NOT NULL,
                vector       vector({dimension}) NOT NULL,
                model        TEXT NOT NULL,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (entry_id, chunk_index)
            )",
            table = defaults::EMBEDDING_TABLE,
            dimension = dimension
        ))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_vector_hnsw
             ON {table} USING hnsw (vector vector_cosine_ops)",
            table = defaults::EMBEDDING_TABLE
        ))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.initialized.store(true, Ordering::Release);
        info!(
            subsystem = "db",
            component = "vector_index",
            op = "init",
            dimension = dimension,
            model = self.embedder.model_name(),
            "Vector index ready"
        );
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn embed_chunks(
        &self,
        entry_id: &str,
        chunks: &[TextChunk],
    ) -> Result<Vec<EmbeddingRecord>> {
        self.ensure_initialized()?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        debug!(
            subsystem = "db",
            component = "vector_index",
            op = "embed_chunks",
            entry_id = %entry_id,
            chunk_count = chunks.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chunks embedded"
        );
        build_embedding_records(entry_id, chunks, vectors)
    }

    async fn replace(&self, entry_id: &str, records: Vec<EmbeddingRecord>) -> Result<()> {
        self.ensure_initialized()?;
        let count = records.len();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        self.replace_tx(&mut tx, entry_id, records).await?;
        tx.commit().await.map_err(Error::Database)?;
        debug!(
            subsystem = "db",
            component = "vector_index",
            op = "replace",
            entry_id = %entry_id,
            chunk_count = count,
            "Embeddings replaced"
        );
        Ok(())
    }

    async fn query(&self, question: &str, top_k: usize) -> Result<Vec<EmbeddingMatch>> {
        self.ensure_initialized()?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed_texts(&[question.to_string()]).await?;
        let query_vec: Vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no embedding returned for question".into()))?;

        let rows = sqlx::query(
            "SELECT id, entry_id, chunk_index, snippet, start_offset, end_offset,
                    1.0 - (vector <=> $1::vector) AS score
             FROM journal_embedding
             ORDER BY vector <=> $1::vector
             LIMIT $2",
        )
        .bind(&query_vec)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let matches: Vec<EmbeddingMatch> = rows
            .iter()
            .map(|row| EmbeddingMatch {
                id: row.get("id"),
                score: row.get::<f64, _>("score") as f32,
                metadata: EmbeddingMetadata {
                    entry_id: row.get("entry_id"),
                    chunk_index: row.get("chunk_index"),
                    snippet: row.get("snippet"),
                    start_offset: row.get("start_offset"),
                    end_offset: row.get("end_offset"),
                },
            })
            .collect();

        for m in &matches {
            trace!(
                subsystem = "db",
                component = "vector_index",
                id = %m.id,
                score = m.score,
                "Match"
            );
        }
        debug!(
            subsystem = "db",
            component = "vector_index",
            op = "query",
            result_count = matches.len(),
            "Vector query complete"
        );
        Ok(matches)
    }
}
