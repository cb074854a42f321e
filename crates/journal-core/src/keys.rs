//! Identifier and object-key conventions.
//!
//! Raw uploads live under `entries/{entryId}/originals/{timestamp}-{filename}`,
//! concatenated output under `entries/{entryId}/merged/final.{ext}`, and
//! embedding records are identified as `{entryId}-chunk-{index}`.

use crate::{Error, Result};

/// Maximum length of an entry ID.
pub const MAX_ENTRY_ID_LEN: usize = 128;

/// Validate a caller-supplied entry ID.
///
/// Accepted shape: `^[A-Za-z0-9][A-Za-z0-9._:-]{0,127}$`. This admits dates,
/// timestamps and UUIDs while keeping IDs safe inside blob keys.
pub fn validate_entry_id(entry_id: &str) -> Result<()> {
    let mut chars = entry_id.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'));

    if !first_ok || !rest_ok || entry_id.len() > MAX_ENTRY_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "invalid entry id '{}': expected 1-{} characters of [A-Za-z0-9._:-] starting with a letter or digit",
            entry_id, MAX_ENTRY_ID_LEN
        )));
    }
    Ok(())
}

/// Validate a blob key: relative, `/`-separated, no empty or dot segments.
pub fn validate_blob_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidInput("blob key is empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(Error::InvalidInput(format!("invalid blob key '{}'", key)));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(Error::InvalidInput(format!("invalid blob key '{}'", key)));
    }
    Ok(())
}

/// Key for a raw audio upload.
///
/// The filename is reduced to a safe single path segment.
pub fn original_audio_key(entry_id: &str, timestamp_ms: i64, filename: &str) -> String {
    format!(
        "entries/{}/originals/{}-{}",
        entry_id,
        timestamp_ms,
        sanitize_filename(filename)
    )
}

/// Key for the concatenated audio of an entry.
pub fn merged_audio_key(entry_id: &str, extension: &str) -> String {
    format!("entries/{}/merged/final.{}", entry_id, extension)
}

/// Identifier of the embedding record for one chunk.
pub fn embedding_record_id(entry_id: &str, chunk_index: usize) -> String {
    format!("{}-chunk-{}", entry_id, chunk_index)
}

fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Lowercased extension of `filename`, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
