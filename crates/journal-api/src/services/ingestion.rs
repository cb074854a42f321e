//! Ingestion orchestrator.
//!
//! Every content-changing path funnels through [`IngestionOrchestrator::update_content`]:
//! analysis and chunk embedding run concurrently, then the entry, its text
//! chunks and its embedding records are replaced together. Content and derived
//! metadata therefore never diverge after a successful call.
//!
//! Adapter failures abort the workflow and propagate. Writes committed before
//! the failing step (a stored blob, an audio chunk row) are not rolled back;
//! callers re-read entry state after an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use journal_core::keys::file_extension;
use journal_core::{
    defaults, original_audio_key, validate_entry_id, with_timeout, AnalysisBackend, AudioChunk,
    ChunkContext, CurrentUserProvider, EmbeddingMatch, EntryAnalysis, EntryPage, EntryRepository,
    Error, GenerationBackend, JournalEntry, ListEntriesRequest, NewAudioChunk, Result,
    UpdateEntryRequest, VectorIndex,
};
use journal_db::{Chunker, StorageBackend};
use journal_inference::TranscriptionBackend;

/// System instruction for retrieval-augmented answers.
pub const QNA_SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions about the \
user's personal journal. Answer using only the journal excerpts provided in the context. Each \
excerpt is prefixed with the date it was written; cite those dates when you use an excerpt. If \
the context does not contain the answer, say that you could not find it in the journal.";

/// Answer returned when retrieval finds nothing to ground a completion on.
pub const NO_MATCHES_ANSWER: &str =
    "I couldn't find any journal entries relevant to that question.";

/// An audio upload as received from the client.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub filename: String,
    /// Declared MIME type; `None` is treated as `application/octet-stream`.
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Result of recording one audio chunk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedChunk {
    pub audio_chunk_id: Uuid,
    pub audio_key: String,
    pub transcript: String,
    pub chunk_order: i32,
    pub entry: JournalEntry,
}

/// A grounded answer plus the raw matches it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct QnaAnswer {
    pub answer: String,
    pub context: Vec<EmbeddingMatch>,
}

/// Collaborators of the orchestrator.
pub struct IngestionDeps {
    pub users: Arc<dyn CurrentUserProvider>,
    pub entries: Arc<dyn EntryRepository>,
    pub index: Arc<dyn VectorIndex>,
    pub analyzer: Arc<dyn AnalysisBackend>,
    pub transcriber: Arc<dyn TranscriptionBackend>,
    pub generator: Arc<dyn GenerationBackend>,
    pub blobs: Arc<dyn StorageBackend>,
    pub chunker: Arc<dyn Chunker>,
}

/// Coordinates the entry store, blob store, model adapters and vector index.
pub struct IngestionOrchestrator {
    users: Arc<dyn CurrentUserProvider>,
    entries: Arc<dyn EntryRepository>,
    index: Arc<dyn VectorIndex>,
    analyzer: Arc<dyn AnalysisBackend>,
    transcriber: Arc<dyn TranscriptionBackend>,
    generator: Arc<dyn GenerationBackend>,
    blobs: Arc<dyn StorageBackend>,
    chunker: Arc<dyn Chunker>,
    adapter_timeout: Duration,
}

impl IngestionOrchestrator {
    pub fn new(deps: IngestionDeps, adapter_timeout: Duration) -> Self {
        Self {
            users: deps.users,
            entries: deps.entries,
            index: deps.index,
            analyzer: deps.analyzer,
            transcriber: deps.transcriber,
            generator: deps.generator,
            blobs: deps.blobs,
            chunker: deps.chunker,
            adapter_timeout,
        }
    }

    async fn ensure_entry(&self, entry_id: &str) -> Result<JournalEntry> {
        validate_entry_id(entry_id)?;
        let user = self.users.current_user().await?;
        self.entries
            .ensure_journal_entry(entry_id, "", user.id)
            .await
    }

    // =========================================================================
    // CONTENT
    // =========================================================================

    /// Replace an entry's content (and optionally its title), regenerating
    /// every derived field. Creates the entry if absent.
    ///
    /// Unchanged content with no new title is a no-op.
    pub async fn update_content(
        &self,
        entry_id: &str,
        content: String,
        title: Option<String>,
    ) -> Result<JournalEntry> {
        let entry = self.ensure_entry(entry_id).await?;
        self.apply_content(entry, content, title).await
    }

    async fn apply_content(
        &self,
        entry: JournalEntry,
        content: String,
        title: Option<String>,
    ) -> Result<JournalEntry> {
        let entry_id = entry.id.as_str();
        let title = title.filter(|t| entry.title.as_ref() != Some(t));
        if content == entry.content && title.is_none() {
            debug!(
                subsystem = "ingest",
                component = "orchestrator",
                op = "update_content",
                entry_id = %entry_id,
                "Content and title unchanged, skipping enrichment"
            );
            return Ok(entry);
        }

        let start = Instant::now();
        // Blank content leaves both the chunk set and the embedding set empty
        let blank = content.trim().is_empty();
        let chunks = if blank {
            Vec::new()
        } else {
            self.chunker.chunk(&content)
        };

        let (analysis, records) = if blank {
            (EntryAnalysis::default(), Vec::new())
        } else {
            tokio::try_join!(
                with_timeout(
                    "analyze",
                    self.adapter_timeout,
                    self.analyzer.analyze(&content)
                ),
                with_timeout(
                    "embed",
                    self.adapter_timeout,
                    self.index.embed_chunks(entry_id, &chunks)
                ),
            )?
        };

        let update = UpdateEntryRequest {
            content: Some(content),
            title,
            ..Default::default()
        }
        .with_analysis(analysis);

        let updated = self.entries.update(entry_id, update).await?;
        self.entries.replace_journal_chunks(entry_id, &chunks).await?;
        with_timeout(
            "index_replace",
            self.adapter_timeout,
            self.index.replace(entry_id, records),
        )
        .await?;

        info!(
            subsystem = "ingest",
            component = "orchestrator",
            op = "update_content",
            entry_id = %entry_id,
            chunk_count = chunks.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Entry content updated"
        );
        Ok(updated)
    }

    // =========================================================================
    // AUDIO
    // =========================================================================

    /// Store, transcribe and append one audio segment to an entry.
    ///
    /// The upload is validated before any side effect. A non-empty transcript
    /// is appended to the entry content and runs through the content-update
    /// path.
    pub async fn record_audio_chunk(
        &self,
        entry_id: &str,
        upload: AudioUpload,
        title: Option<String>,
    ) -> Result<RecordedChunk> {
        validate_entry_id(entry_id)?;
        let mime_type = validate_audio_upload(&upload)?;

        let start = Instant::now();
        self.ensure_entry(entry_id).await?;

        let audio_key =
            original_audio_key(entry_id, Utc::now().timestamp_millis(), &upload.filename);
        with_timeout(
            "blob_put",
            self.adapter_timeout,
            self.blobs.put(&audio_key, &upload.data),
        )
        .await?;

        let transcription = with_timeout(
            "transcribe",
            self.adapter_timeout,
            self.transcriber.transcribe(&upload.data, &mime_type, None),
        )
        .await?;
        let transcript = transcription.full_text.trim().to_string();

        let chunk = self
            .entries
            .insert_audio_chunk(NewAudioChunk {
                entry_id: entry_id.to_string(),
                audio_key: audio_key.clone(),
                transcript: transcript.clone(),
            })
            .await?;

        let current = self.entries.fetch(entry_id).await?;
        let content = append_transcript(&current.content, &transcript);
        let entry = self.apply_content(current, content, title).await?;

        info!(
            subsystem = "ingest",
            component = "orchestrator",
            op = "record_chunk",
            entry_id = %entry_id,
            chunk_order = chunk.chunk_order,
            byte_len = upload.data.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Audio chunk recorded"
        );

        Ok(RecordedChunk {
            audio_chunk_id: chunk.id,
            audio_key,
            transcript,
            chunk_order: chunk.chunk_order,
            entry,
        })
    }

    // =========================================================================
    // SUMMARIZATION
    // =========================================================================

    /// Regenerate key points only. Fails with `NoContent` on an empty entry.
    pub async fn summarize(&self, entry_id: &str) -> Result<JournalEntry> {
        let entry = self.ensure_entry(entry_id).await?;
        if !entry.has_content() {
            return Err(Error::NoContent(entry_id.to_string()));
        }

        let key_points = with_timeout(
            "key_points",
            self.adapter_timeout,
            self.analyzer.key_points(&entry.content),
        )
        .await?;

        debug!(
            subsystem = "ingest",
            component = "orchestrator",
            op = "summarize",
            entry_id = %entry_id,
            result_count = key_points.len(),
            "Key points regenerated"
        );

        self.entries
            .update(
                entry_id,
                UpdateEntryRequest {
                    key_points: Some(key_points),
                    ..Default::default()
                },
            )
            .await
    }

    // =========================================================================
    // QUESTION ANSWERING
    // =========================================================================

    /// Retrieve the `top_k` most similar chunks and answer from them.
    ///
    /// When nothing relevant is found a fixed answer is returned without
    /// calling the completion model.
    pub async fn answer_question(&self, question: &str, top_k: usize) -> Result<QnaAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("question is required".to_string()));
        }

        let start = Instant::now();
        let matches = with_timeout(
            "query",
            self.adapter_timeout,
            self.index.query(question, top_k.max(1)),
        )
        .await?;

        let keys: Vec<(String, i32)> = matches
            .iter()
            .map(|m| (m.metadata.entry_id.clone(), m.metadata.chunk_index))
            .collect();
        let contexts = if keys.is_empty() {
            Vec::new()
        } else {
            self.entries.fetch_chunk_contexts(&keys).await?
        };

        if contexts.is_empty() {
            debug!(
                subsystem = "ingest",
                component = "orchestrator",
                op = "qna",
                result_count = matches.len(),
                "No chunk context found, returning fallback answer"
            );
            return Ok(QnaAnswer {
                answer: NO_MATCHES_ANSWER.to_string(),
                context: matches,
            });
        }

        let prompt = format!(
            "Context:\n{}\n\nQuestion: {}",
            build_context_block(&contexts),
            question
        );
        let answer = with_timeout(
            "complete",
            self.adapter_timeout,
            self.generator.generate_with_system(QNA_SYSTEM_PROMPT, &prompt),
        )
        .await?;

        info!(
            subsystem = "ingest",
            component = "orchestrator",
            op = "qna",
            result_count = matches.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Question answered"
        );

        Ok(QnaAnswer {
            answer: answer.trim().to_string(),
            context: matches,
        })
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn get_entry(&self, entry_id: &str) -> Result<JournalEntry> {
        validate_entry_id(entry_id)?;
        self.entries.fetch(entry_id).await
    }

    /// Audio chunks of an existing entry in recording order.
    pub async fn audio_chunks(&self, entry_id: &str) -> Result<Vec<AudioChunk>> {
        validate_entry_id(entry_id)?;
        if !self.entries.exists(entry_id).await? {
            return Err(Error::EntryNotFound(entry_id.to_string()));
        }
        self.entries.list_audio_chunks(entry_id).await
    }

    /// The current user's entries, newest first.
    pub async fn list_entries(&self, req: ListEntriesRequest) -> Result<EntryPage> {
        let user = self.users.current_user().await?;
        self.entries.list(user.id, req).await
    }
}

/// Check extension, declared MIME type and size of an upload. Returns the
/// MIME type to hand to the transcription adapter.
pub fn validate_audio_upload(upload: &AudioUpload) -> Result<String> {
    let ext = file_extension(&upload.filename)
        .filter(|ext| defaults::ALLOWED_AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "unsupported audio file '{}': expected one of {}",
                upload.filename,
                defaults::ALLOWED_AUDIO_EXTENSIONS.join(", ")
            ))
        })?;

    let declared = upload
        .content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    if !defaults::ALLOWED_AUDIO_MIME_TYPES.contains(&declared.as_str()) {
        return Err(Error::InvalidInput(format!(
            "unsupported audio content type '{}'",
            declared
        )));
    }

    if upload.data.is_empty() {
        return Err(Error::InvalidInput("audio file is empty".to_string()));
    }

    if declared == "application/octet-stream" {
        Ok(mime_for_extension(&ext).to_string())
    } else {
        Ok(declared)
    }
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/m4a",
        "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}

/// Existing content followed by the transcript, single-space separated.
pub fn append_transcript(content: &str, transcript: &str) -> String {
    if transcript.is_empty() {
        return content.to_string();
    }
    format!("{} {}", content, transcript).trim().to_string()
}

/// One paragraph per chunk, each prefixed with its entry's date.
pub fn build_context_block(contexts: &[ChunkContext]) -> String {
    contexts
        .iter()
        .map(|c| {
            format!(
                "[{}] {}",
                c.entry_created_at.format("%B %-d, %Y"),
                c.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
