//! Signed blob downloads.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde::Deserialize;

use journal_core::keys::file_extension;

use crate::{ApiError, AppState};

/// Signature parameters appended by `StorageBackend::signed_url`.
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// Serve a blob after checking its URL signature and expiry.
///
/// # Returns
/// - 200 OK with the object bytes
/// - 400 Bad Request if `expires` or `signature` is missing
/// - 403 Forbidden if the signature is wrong or expired
/// - 404 Not Found if the object does not exist
pub async fn get_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    state
        .blobs
        .verify_signature(&key, query.expires, &query.signature)?;

    let bytes = state.blobs.get(&key).await?;
    let content_type = content_type_for(&key, &bytes);

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, no-store".to_string()),
        ],
        bytes,
    ))
}

/// Sniffed MIME type, then a guess from the key's extension.
fn content_type_for(key: &str, bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    let guess = match file_extension(key).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("mp4") => "audio/mp4",
        Some("aac") => "audio/aac",
        _ => "application/octet-stream",
    };
    guess.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_sniffs_bytes() {
        let wav = b"RIFF\x24\x00\x00\x00WAVEfmt ";
        assert_eq!(content_type_for("x/a.bin", wav), "audio/x-wav");
    }

    #[test]
    fn test_content_type_falls_back_to_extension() {
        assert_eq!(content_type_for("x/a.m4a", b"plain"), "audio/mp4");
        assert_eq!(content_type_for("x/a", b"plain"), "application/octet-stream");
    }
}
