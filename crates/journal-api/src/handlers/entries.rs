//! Journal entry HTTP handlers.
//!
//! Thin adapters over [`IngestionOrchestrator`] and [`AudioConcatenator`]:
//! extract and validate the request shape, delegate, and wrap the result.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use journal_core::{AudioChunk, JournalEntry, ListEntriesRequest};
use journal_db::{SignedUrl, StorageBackend};

use crate::services::{AudioUpload, RecordedChunk};
use crate::{ApiError, AppState};

/// Response wrapper for endpoints returning a single entry.
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub entry: JournalEntry,
}

/// Request body for `POST /entries/:id`.
#[derive(Debug, Deserialize)]
pub struct UpdateEntryBody {
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Query parameters for `GET /entries/list`.
#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    pub limit: Option<i64>,
    /// RFC 3339 `createdAt` of the last item of the previous page.
    pub cursor: Option<String>,
}

/// Response for `POST /entries/:id/concatenate`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcatenateResponse {
    pub success: bool,
    pub merged_file_key: Option<String>,
    pub message: String,
}

/// An audio chunk with a time-limited download URL.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunkView {
    #[serde(flatten)]
    pub chunk: AudioChunk,
    pub audio_url: String,
    pub url_expires_at: DateTime<Utc>,
}

/// Entry detail including its recorded audio.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDetail {
    #[serde(flatten)]
    pub entry: JournalEntry,
    pub audio_chunks: Vec<AudioChunkView>,
}

/// Merged audio of an entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedAudioView {
    pub key: String,
    #[serde(flatten)]
    pub url: SignedUrl,
}

/// Response for `GET /entries/:id/audio`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryAudioResponse {
    pub entry_id: String,
    pub chunks: Vec<AudioChunkView>,
    pub merged: Option<MergedAudioView>,
}

fn chunk_views(
    blobs: &dyn StorageBackend,
    chunks: Vec<AudioChunk>,
) -> Result<Vec<AudioChunkView>, ApiError> {
    chunks
        .into_iter()
        .map(|chunk| {
            let signed = blobs.signed_url(&chunk.audio_key)?;
            Ok(AudioChunkView {
                chunk,
                audio_url: signed.url,
                url_expires_at: signed.expires_at,
            })
        })
        .collect()
}

/// Upload one audio segment, transcribe it and append it to the entry.
///
/// # Multipart Fields
/// - `audio`: audio file (required; mp3, wav, m4a, mp4 or aac)
/// - `title`: entry title (optional)
///
/// # Returns
/// - 200 OK with `{audioChunkId, audioKey, transcript, chunkOrder, entry}`
/// - 400 Bad Request if the file is missing, empty or of an unsupported type
/// - 500 if storage, transcription or enrichment fails
pub async fn record_chunk(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecordedChunk>, ApiError> {
    let mut multipart = multipart?;
    let mut upload: Option<AudioUpload> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("audio") => {
                let filename = field.file_name().unwrap_or("audio").to_string();
                let content_type = field.content_type().map(|c| c.to_string());
                let data = field.bytes().await?.to_vec();
                upload = Some(AudioUpload {
                    filename,
                    content_type,
                    data,
                });
            }
            Some("title") => {
                let val = field.text().await?;
                if !val.trim().is_empty() {
                    title = Some(val.trim().to_string());
                }
            }
            _ => {} // ignore unknown fields
        }
    }

    let upload = upload
        .ok_or_else(|| ApiError::BadRequest("Missing audio file in multipart form".to_string()))?;

    let recorded = state
        .orchestrator
        .record_audio_chunk(&entry_id, upload, title)
        .await?;
    Ok(Json(recorded))
}

/// Replace entry content (and optionally title), regenerating metadata.
pub async fn update_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    body: Result<Json<UpdateEntryBody>, JsonRejection>,
) -> Result<Json<EntryResponse>, ApiError> {
    let Json(body) = body?;
    let entry = state
        .orchestrator
        .update_content(&entry_id, body.content, body.title)
        .await?;
    Ok(Json(EntryResponse { entry }))
}

/// Regenerate key points. 400 when the entry has no content.
pub async fn summarize_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<EntryResponse>, ApiError> {
    let entry = state.orchestrator.summarize(&entry_id).await?;
    Ok(Json(EntryResponse { entry }))
}

/// Merge the given audio keys, in order, into the entry's final audio file.
///
/// The body is taken as raw JSON so that a non-array `fileKeys` is reported
/// as a validation error rather than a deserialization failure.
pub async fn concatenate_audio(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<ConcatenateResponse>, ApiError> {
    let Json(body) = body?;
    let file_keys = parse_file_keys(&body)?;

    let merged_file_key = state
        .concatenator
        .concatenate(&entry_id, &file_keys)
        .await?;

    let message = match &merged_file_key {
        Some(_) => format!("Merged {} audio chunks", file_keys.len()),
        None => "No audio chunks to merge".to_string(),
    };
    Ok(Json(ConcatenateResponse {
        success: true,
        merged_file_key,
        message,
    }))
}

/// `fileKeys` as an ordered list of strings. Missing or null means empty.
pub fn parse_file_keys(body: &JsonValue) -> Result<Vec<String>, ApiError> {
    match body.get("fileKeys") {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ApiError::BadRequest("fileKeys must contain only strings".to_string())
                })
            })
            .collect(),
        Some(_) => Err(ApiError::BadRequest(
            "fileKeys must be an array".to_string(),
        )),
    }
}

/// Fetch an entry with its audio chunks. 404 if absent.
pub async fn get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<EntryDetail>, ApiError> {
    let entry = state.orchestrator.get_entry(&entry_id).await?;
    let chunks = state.orchestrator.audio_chunks(&entry_id).await?;
    let audio_chunks = chunk_views(state.blobs.as_ref(), chunks)?;
    Ok(Json(EntryDetail {
        entry,
        audio_chunks,
    }))
}

/// Signed URLs for every audio chunk and for the merged file when present.
pub async fn get_entry_audio(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<EntryAudioResponse>, ApiError> {
    let chunks = state.orchestrator.audio_chunks(&entry_id).await?;
    let chunks = chunk_views(state.blobs.as_ref(), chunks)?;

    let merged = match state.concatenator.merged_key(&entry_id).await? {
        Some(key) => {
            let url = state.blobs.signed_url(&key)?;
            Some(MergedAudioView { key, url })
        }
        None => None,
    };

    Ok(Json(EntryAudioResponse {
        entry_id,
        chunks,
        merged,
    }))
}

/// Cursor-paginated entry listing, newest first.
pub async fn list_entries(
    State(state): State<AppState>,
    query: Result<Query<ListEntriesQuery>, QueryRejection>,
) -> Result<Json<journal_core::EntryPage>, ApiError> {
    let Query(query) = query?;
    let cursor = query
        .cursor
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(|c| {
            DateTime::parse_from_rfc3339(c.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| {
                    ApiError::BadRequest(format!(
                        "Invalid cursor '{}': expected an RFC 3339 timestamp",
                        c
                    ))
                })
        })
        .transpose()?;

    let page = state
        .orchestrator
        .list_entries(ListEntriesRequest {
            limit: query.limit,
            cursor,
        })
        .await?;
    Ok(Json(page))
}
