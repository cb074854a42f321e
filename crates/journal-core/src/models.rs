//! Core data models for the journal backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;

pub use pgvector::Vector;

// =============================================================================
// IDENTITY
// =============================================================================

/// Account that owns journal entries.
///
/// Only a single placeholder user exists today; see [`crate::CurrentUserProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// ENTRIES
// =============================================================================

/// A journal entry with its derived metadata.
///
/// `content` is the authoritative text. Every derived field (sentiment, tags,
/// entities, key points, chunks, embeddings) is regenerated together whenever
/// `content` changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub title: Option<String>,
    pub content: String,
    /// Signed score in -3..=3.
    pub sentiment: f32,
    pub emotion_tags: Vec<String>,
    pub topic_tags: Vec<String>,
    pub entities: Vec<String>,
    pub key_points: Vec<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Partial update of an entry. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryRequest {
    pub content: Option<String>,
    pub title: Option<String>,
    pub sentiment: Option<f32>,
    pub emotion_tags: Option<Vec<String>>,
    pub topic_tags: Option<Vec<String>>,
    pub entities: Option<Vec<String>>,
    pub key_points: Option<Vec<String>>,
}

impl UpdateEntryRequest {
    /// Set every derived field from an analysis result.
    pub fn with_analysis(mut self, analysis: EntryAnalysis) -> Self {
        self.sentiment = Some(analysis.sentiment);
        self.emotion_tags = Some(analysis.emotions);
        self.topic_tags = Some(analysis.topics);
        self.entities = Some(analysis.entities);
        self.key_points = Some(analysis.key_points);
        self
    }
}

/// Cursor-paginated listing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListEntriesRequest {
    pub limit: Option<i64>,
    /// `createdAt` of the last item of the previous page.
    pub cursor: Option<DateTime<Utc>>,
}

impl ListEntriesRequest {
    /// Page size clamped to `1..=PAGE_LIMIT_MAX`.
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(defaults::PAGE_LIMIT)
            .clamp(1, defaults::PAGE_LIMIT_MAX)
    }
}

/// One page of entries, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub items: Vec<JournalEntry>,
    pub next_cursor: Option<DateTime<Utc>>,
    pub has_more: bool,
}

impl EntryPage {
    /// Build a page from rows fetched with `limit + 1` over-fetch.
    pub fn from_overfetch(mut rows: Vec<JournalEntry>, limit: i64) -> Self {
        let limit = limit.max(0) as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(|e| e.created_at)
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
            has_more,
        }
    }
}

// =============================================================================
// ANALYSIS
// =============================================================================

/// Structured output of the analysis adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryAnalysis {
    pub sentiment: f32,
    pub emotions: Vec<String>,
    pub topics: Vec<String>,
    pub entities: Vec<String>,
    pub key_points: Vec<String>,
}

impl EntryAnalysis {
    /// Clamp sentiment into range and clean up every list: trim, drop empties,
    /// and remove case-insensitive duplicates (first spelling wins).
    pub fn normalized(self) -> Self {
        let sentiment = if self.sentiment.is_finite() {
            self.sentiment.clamp(-3.0, 3.0)
        } else {
            0.0
        };
        Self {
            sentiment,
            emotions: clean_tags(self.emotions),
            topics: clean_tags(self.topics),
            entities: clean_tags(self.entities),
            key_points: self
                .key_points
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

// =============================================================================
// AUDIO
// =============================================================================

/// One recorded audio segment of an entry. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    pub id: Uuid,
    pub entry_id: String,
    /// Zero-based, gap-free per entry.
    pub chunk_order: i32,
    pub audio_key: String,
    pub transcript: String,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to persist a new audio chunk; the order is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAudioChunk {
    pub entry_id: String,
    pub audio_key: String,
    pub transcript: String,
}

// =============================================================================
// TEXT CHUNKS
// =============================================================================

/// A contiguous span of entry content produced by the chunker.
///
/// Offsets count Unicode scalar values, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChunk {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl TextChunk {
    pub fn snippet(&self) -> String {
        snippet_of(&self.text)
    }
}

/// Persisted text chunk of an entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalChunk {
    pub id: Uuid,
    pub entry_id: String,
    pub chunk_index: i32,
    pub start_offset: i32,
    pub end_offset: i32,
    pub snippet: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A stored chunk joined with its parent entry's creation time, used to build
/// question-answering context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkContext {
    pub entry_id: String,
    pub chunk_index: i32,
    pub text: String,
    pub snippet: String,
    pub entry_created_at: DateTime<Utc>,
}

/// First `SNIPPET_CHARS` characters of `text`.
pub fn snippet_of(text: &str) -> String {
    text.chars().take(defaults::SNIPPET_CHARS).collect()
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Metadata mirrored next to every embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingMetadata {
    pub entry_id: String,
    pub chunk_index: i32,
    pub snippet: String,
    pub start_offset: i32,
    pub end_offset: i32,
}

/// A vector plus metadata, identified by `{entryId}-chunk-{index}`.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vector,
    pub metadata: EmbeddingMetadata,
}

/// A nearest-neighbour hit. `score` is cosine similarity (higher is closer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingMatch {
    pub id: String,
    pub score: f32,
    pub metadata: EmbeddingMetadata,
}

/// Pair chunks with their vectors, index-aligned.
pub fn build_embedding_records(
    entry_id: &str,
    chunks: &[TextChunk],
    vectors: Vec<Vector>,
) -> crate::Result<Vec<EmbeddingRecord>> {
    if chunks.len() != vectors.len() {
        return Err(crate::Error::Embedding(format!(
            "expected {} vectors, got {}",
            chunks.len(),
            vectors.len()
        )));
    }
    Ok(chunks
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(index, (chunk, vector))| EmbeddingRecord {
            id: crate::keys::embedding_record_id(entry_id, index),
            vector,
            metadata: EmbeddingMetadata {
                entry_id: entry_id.to_string(),
                chunk_index: index as i32,
                snippet: chunk.snippet(),
                start_offset: chunk.start_offset as i32,
                end_offset: chunk.end_offset as i32,
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_at(secs: i64) -> JournalEntry {
        let ts = DateTime::from_timestamp(secs, 0).unwrap();
        JournalEntry {
            id: format!("e{}", secs),
            title: None,
            content: String::new(),
            sentiment: 0.0,
            emotion_tags: vec![],
            topic_tags: vec![],
            entities: vec![],
            key_points: vec![],
            user_id: Uuid::nil(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_page_from_overfetch_has_more() {
        let rows: Vec<_> = (0..21).rev().map(entry_at).collect();
        let page = EntryPage::from_overfetch(rows, 20);
        assert_eq!(page.items.len(), 20);
        assert!(page.has_more);
        assert_eq!(page.next_cursor, Some(page.items[19].created_at));
    }

    #[test]
    fn test_page_from_overfetch_last_page() {
        let rows: Vec<_> = (0..5).rev().map(entry_at).collect();
        let page = EntryPage::from_overfetch(rows, 20);
        assert_eq!(page.items.len(), 5);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_effective_limit_clamps() {
        let req = ListEntriesRequest {
            limit: Some(0),
            cursor: None,
        };
        assert_eq!(req.effective_limit(), 1);
        let req = ListEntriesRequest {
            limit: Some(10_000),
            cursor: None,
        };
        assert_eq!(req.effective_limit(), defaults::PAGE_LIMIT_MAX);
        assert_eq!(
            ListEntriesRequest::default().effective_limit(),
            defaults::PAGE_LIMIT
        );
    }

    #[test]
    fn test_analysis_normalized() {
        let analysis = EntryAnalysis {
            sentiment: 7.5,
            emotions: vec!["Joy".into(), " joy ".into(), "".into(), "calm".into()],
            topics: vec!["work".into()],
            entities: vec![" Alice ".into()],
            key_points: vec!["  first ".into(), "   ".into(), "second".into()],
        }
        .normalized();

        assert_eq!(analysis.sentiment, 3.0);
        assert_eq!(analysis.emotions, vec!["Joy", "calm"]);
        assert_eq!(analysis.entities, vec!["Alice"]);
        assert_eq!(analysis.key_points, vec!["first", "second"]);
    }

    #[test]
    fn test_analysis_normalized_non_finite_sentiment() {
        let analysis = EntryAnalysis {
            sentiment: f32::NAN,
            ..Default::default()
        }
        .normalized();
        assert_eq!(analysis.sentiment, 0.0);
    }

    #[test]
    fn test_update_request_with_analysis() {
        let req = UpdateEntryRequest {
            content: Some("hello".into()),
            ..Default::default()
        }
        .with_analysis(EntryAnalysis {
            sentiment: 1.0,
            key_points: vec!["k".into()],
            ..Default::default()
        });
        assert_eq!(req.sentiment, Some(1.0));
        assert_eq!(req.key_points, Some(vec!["k".to_string()]));
        assert_eq!(req.emotion_tags, Some(vec![]));
    }

    #[test]
    fn test_snippet_is_char_bounded() {
        let text = "é".repeat(150);
        let snippet = snippet_of(&text);
        assert_eq!(snippet.chars().count(), 100);
    }

    #[test]
    fn test_build_embedding_records_aligns_indexes() {
        let chunks = vec![
            TextChunk {
                text: "abc".into(),
                start_offset: 0,
                end_offset: 3,
            },
            TextChunk {
                text: "de".into(),
                start_offset: 3,
                end_offset: 5,
            },
        ];
        let vectors = vec![Vector::from(vec![1.0, 0.0]), Vector::from(vec![0.0, 1.0])];
        let records = build_embedding_records("2025-01-05", &chunks, vectors).unwrap();
        assert_eq!(records[0].id, "2025-01-05-chunk-0");
        assert_eq!(records[1].id, "2025-01-05-chunk-1");
        assert_eq!(records[1].metadata.chunk_index, 1);
        assert_eq!(records[1].metadata.start_offset, 3);
        assert_eq!(records[1].metadata.snippet, "de");
    }

    #[test]
    fn test_build_embedding_records_length_mismatch() {
        let chunks = vec![TextChunk {
            text: "abc".into(),
            start_offset: 0,
            end_offset: 3,
        }];
        let err = build_embedding_records("e", &chunks, vec![]).unwrap_err();
        assert!(matches!(err, crate::Error::Embedding(_)));
    }

    #[test]
    fn test_user_hash_not_serialized() {
        let user = User {
            id: Uuid::nil(),
            email: "a@b.c".into(),
            password_hash: "secret".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("createdAt"));
    }
}
