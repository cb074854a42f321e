//! Entry store: users, journal entries, audio chunks and text chunks.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use journal_core::{
    defaults, snippet_of, AudioChunk, ChunkContext, EntryPage, EntryRepository, Error,
    JournalChunk, JournalEntry, ListEntriesRequest, NewAudioChunk, Result, TextChunk,
    UpdateEntryRequest, User, UserRepository,
};

const ENTRY_COLUMNS: &str = "id, user_id, title, content, sentiment, emotion_tags, topic_tags, \
                             entities, key_points, created_at, updated_at";

const AUDIO_CHUNK_COLUMNS: &str = "id, entry_id, chunk_order, audio_key, transcript, created_at";

const JOURNAL_CHUNK_COLUMNS: &str =
    "id, entry_id, chunk_index, start_offset, end_offset, snippet, text, created_at";

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn entry_from_row(row: &PgRow) -> JournalEntry {
    JournalEntry {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        sentiment: row.get("sentiment"),
        emotion_tags: row.get("emotion_tags"),
        topic_tags: row.get("topic_tags"),
        entities: row.get("entities"),
        key_points: row.get("key_points"),
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn audio_chunk_from_row(row: &PgRow) -> AudioChunk {
    AudioChunk {
        id: row.get("id"),
        entry_id: row.get("entry_id"),
        chunk_order: row.get("chunk_order"),
        audio_key: row.get("audio_key"),
        transcript: row.get("transcript"),
        created_at: row.get("created_at"),
    }
}

fn journal_chunk_from_row(row: &PgRow) -> JournalChunk {
    JournalChunk {
        id: row.get("id"),
        entry_id: row.get("entry_id"),
        chunk_index: row.get("chunk_index"),
        start_offset: row.get("start_offset"),
        end_offset: row.get("end_offset"),
        snippet: row.get("snippet"),
        text: row.get("text"),
        created_at: row.get("created_at"),
    }
}

// =============================================================================
// USERS
// =============================================================================

/// PostgreSQL implementation of UserRepository.
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    /// Create a new PgUserRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn ensure_default_user(&self) -> Result<User> {
        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO app_user (id, email, password_hash, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(Uuid::now_v7())
        .bind(defaults::DEFAULT_USER_EMAIL)
        .bind(defaults::DEFAULT_USER_PASSWORD_HASH)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if inserted.rows_affected() > 0 {
            info!(
                subsystem = "db",
                component = "users",
                op = "ensure_default_user",
                "Created default user"
            );
        }

        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at, updated_at FROM app_user WHERE email = $1",
        )
        .bind(defaults::DEFAULT_USER_EMAIL)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(user_from_row(&row))
    }

    async fn fetch(&self, id: Uuid) -> Result<User> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at, updated_at FROM app_user WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("User {} not found", id)))?;

        Ok(user_from_row(&row))
    }
}

// =============================================================================
// ENTRIES
// =============================================================================

/// PostgreSQL implementation of EntryRepository.
pub struct PgEntryRepository {
    pool: Pool<Postgres>,
}

impl PgEntryRepository {
    /// Create a new PgEntryRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Lock the entry row for the rest of the transaction.
    async fn lock_entry_tx(&self, tx: &mut Transaction<'_, Postgres>, entry_id: &str) -> Result<()> {
        sqlx::query("SELECT id FROM journal_entry WHERE id = $1 FOR UPDATE")
            .bind(entry_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        Ok(())
    }

    /// Insert an audio chunk within an existing transaction.
    ///
    /// The parent entry row is locked before the order is computed, so
    /// concurrent submissions for one entry serialize here. The
    /// `(entry_id, chunk_order)` unique constraint is the backstop.
    pub async fn insert_audio_chunk_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chunk: NewAudioChunk,
    ) -> Result<AudioChunk> {
        self.lock_entry_tx(tx, &chunk.entry_id).await?;

        let order: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(chunk_order) + 1, 0) FROM audio_chunk WHERE entry_id = $1",
        )
        .bind(&chunk.entry_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let id = Uuid::now_v7();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO audio_chunk (id, entry_id, chunk_order, audio_key, transcript, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(&chunk.entry_id)
        .bind(order)
        .bind(&chunk.audio_key)
        .bind(&chunk.transcript)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "entries",
            op = "insert_audio_chunk",
            entry_id = %chunk.entry_id,
            chunk_order = order,
            "Audio chunk inserted"
        );

        Ok(AudioChunk {
            id,
            entry_id: chunk.entry_id,
            chunk_order: order,
            audio_key: chunk.audio_key,
            transcript: chunk.transcript,
            created_at: now,
        })
    }

    /// Replace the text chunks of an entry within an existing transaction.
    pub async fn replace_journal_chunks_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry_id: &str,
        chunks: &[TextChunk],
    ) -> Result<Vec<JournalChunk>> {
        self.lock_entry_tx(tx, entry_id).await?;

        let deleted = sqlx::query("DELETE FROM journal_chunk WHERE entry_id = $1")
            .bind(entry_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        let now = Utc::now();
        let mut stored = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let record = JournalChunk {
                id: Uuid::now_v7(),
                entry_id: entry_id.to_string(),
                chunk_index: index as i32,
                start_offset: chunk.start_offset as i32,
                end_offset: chunk.end_offset as i32,
                snippet: snippet_of(&chunk.text),
                text: chunk.text.clone(),
                created_at: now,
            };
            sqlx::query(
                "INSERT INTO journal_chunk
                    (id, entry_id, chunk_index, start_offset, end_offset, snippet, text, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(record.id)
            .bind(&record.entry_id)
            .bind(record.chunk_index)
            .bind(record.start_offset)
            .bind(record.end_offset)
            .bind(&record.snippet)
            .bind(&record.text)
            .bind(record.created_at)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
            stored.push(record);
        }

        debug!(
            subsystem = "db",
            component = "entries",
            op = "replace_journal_chunks",
            entry_id = %entry_id,
            deleted = deleted,
            chunk_count = stored.len(),
            "Journal chunks replaced"
        );

        Ok(stored)
    }
}

#[async_trait]
impl EntryRepository for PgEntryRepository {
    async fn ensure_journal_entry(
        &self,
        entry_id: &str,
        initial_content: &str,
        owner_id: Uuid,
    ) -> Result<JournalEntry> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let inserted = sqlx::query(
            "INSERT INTO journal_entry (id, user_id, content, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(entry_id)
        .bind(owner_id)
        .bind(initial_content)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        let row = sqlx::query(&format!(
            "SELECT {} FROM journal_entry WHERE id = $1",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        if inserted > 0 {
            info!(
                subsystem = "db",
                component = "entries",
                op = "create_entry",
                entry_id = %entry_id,
                "Journal entry created"
            );
        }

        Ok(entry_from_row(&row))
    }

    async fn fetch(&self, entry_id: &str) -> Result<JournalEntry> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM journal_entry WHERE id = $1",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;

        Ok(entry_from_row(&row))
    }

    async fn exists(&self, entry_id: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM journal_entry WHERE id = $1)")
                .bind(entry_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(exists)
    }

    async fn update(&self, entry_id: &str, req: UpdateEntryRequest) -> Result<JournalEntry> {
        let row = sqlx::query(&format!(
            "UPDATE journal_entry SET
                content      = COALESCE($2, content),
                title        = COALESCE($3, title),
                sentiment    = COALESCE($4, sentiment),
                emotion_tags = COALESCE($5, emotion_tags),
                topic_tags   = COALESCE($6, topic_tags),
                entities     = COALESCE($7, entities),
                key_points   = COALESCE($8, key_points),
                updated_at   = $9
             WHERE id = $1
             RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .bind(req.content)
        .bind(req.title)
        .bind(req.sentiment)
        .bind(req.emotion_tags)
        .bind(req.topic_tags)
        .bind(req.entities)
        .bind(req.key_points)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;

        Ok(entry_from_row(&row))
    }

    async fn list(&self, user_id: Uuid, req: ListEntriesRequest) -> Result<EntryPage> {
        let limit = req.effective_limit();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM journal_entry
             WHERE user_id = $1 AND ($2::timestamptz IS NULL OR created_at < $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3",
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .bind(req.cursor)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let entries = rows.iter().map(entry_from_row).collect();
        Ok(EntryPage::from_overfetch(entries, limit))
    }

    async fn next_audio_chunk_order(&self, entry_id: &str) -> Result<i32> {
        let order: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(chunk_order) + 1, 0) FROM audio_chunk WHERE entry_id = $1",
        )
        .bind(entry_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(order)
    }

    async fn insert_audio_chunk(&self, chunk: NewAudioChunk) -> Result<AudioChunk> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let result = self.insert_audio_chunk_tx(&mut tx, chunk).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(result)
    }

    async fn list_audio_chunks(&self, entry_id: &str) -> Result<Vec<AudioChunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM audio_chunk WHERE entry_id = $1 ORDER BY chunk_order ASC",
            AUDIO_CHUNK_COLUMNS
        ))
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(audio_chunk_from_row).collect())
    }

    async fn replace_journal_chunks(
        &self,
        entry_id: &str,
        chunks: &[TextChunk],
    ) -> Result<Vec<JournalChunk>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let result = self.replace_journal_chunks_tx(&mut tx, entry_id, chunks).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(result)
    }

    async fn list_journal_chunks(&self, entry_id: &str) -> Result<Vec<JournalChunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM journal_chunk WHERE entry_id = $1 ORDER BY chunk_index ASC",
            JOURNAL_CHUNK_COLUMNS
        ))
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(journal_chunk_from_row).collect())
    }

    async fn fetch_chunk_contexts(&self, keys: &[(String, i32)]) -> Result<Vec<ChunkContext>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let entry_ids: Vec<String> = keys.iter().map(|(id, _)| id.clone()).collect();
        let indexes: Vec<i32> = keys.iter().map(|(_, index)| *index).collect();

        let rows = sqlx::query(
            "SELECT c.entry_id, c.chunk_index, c.text, c.snippet, e.created_at AS entry_created_at
             FROM UNNEST($1::text[], $2::int4[]) WITH ORDINALITY AS k(entry_id, chunk_index, ord)
             JOIN journal_chunk c ON c.entry_id = k.entry_id AND c.chunk_index = k.chunk_index
             JOIN journal_entry e ON e.id = c.entry_id
             ORDER BY k.ord",
        )
        .bind(&entry_ids)
        .bind(&indexes)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|row| ChunkContext {
                entry_id: row.get("entry_id"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                snippet: row.get("snippet"),
                entry_created_at: row.get("entry_created_at"),
            })
            .collect())
    }
}
