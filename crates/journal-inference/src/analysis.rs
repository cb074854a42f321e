//! LLM-backed analysis adapter.
//!
//! Asks a chat model for entry metadata (sentiment, emotions, topics,
//! entities) and for key points as two independent prompts run concurrently.
//! Model output is parsed leniently: missing or mistyped fields fall back to
//! neutral defaults and the result is normalized before it leaves the adapter.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use journal_core::{AnalysisBackend, EntryAnalysis, Error, GenerationBackend, Result};

const METADATA_SYSTEM_PROMPT: &str = "You analyze personal journal entries. \
Respond with a single JSON object and nothing else, using exactly these keys: \
\"sentiment\" (number from -3 very negative to 3 very positive), \
\"emotions\" (array of short lowercase emotion words), \
\"topics\" (array of short topic tags), \
\"entities\" (array of people, places and organizations mentioned).";

const KEY_POINTS_SYSTEM_PROMPT: &str = "You summarize personal journal entries. \
Respond with a single JSON object and nothing else: \
{\"keyPoints\": [\"...\"]} holding at most five short key points in the order \
they occur in the entry.";

/// Analysis adapter that delegates to a [`GenerationBackend`].
pub struct LlmAnalyzer {
    generator: Arc<dyn GenerationBackend>,
}

impl LlmAnalyzer {
    pub fn new(generator: Arc<dyn GenerationBackend>) -> Self {
        Self { generator }
    }

    async fn metadata(&self, text: &str) -> Result<EntryAnalysis> {
        let raw = self
            .generator
            .generate_with_system(METADATA_SYSTEM_PROMPT, text)
            .await?;
        parse_metadata(&raw)
    }
}

#[async_trait]
impl AnalysisBackend for LlmAnalyzer {
    async fn analyze(&self, text: &str) -> Result<EntryAnalysis> {
        let start = Instant::now();
        let (metadata, key_points) = tokio::try_join!(self.metadata(text), self.key_points(text))?;

        let analysis = EntryAnalysis {
            key_points,
            ..metadata
        }
        .normalized();

        debug!(
            subsystem = "inference",
            component = "analysis",
            op = "analyze",
            prompt_len = text.len(),
            sentiment = analysis.sentiment,
            key_point_count = analysis.key_points.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Entry analyzed"
        );
        Ok(analysis)
    }

    async fn key_points(&self, text: &str) -> Result<Vec<String>> {
        let raw = self
            .generator
            .generate_with_system(KEY_POINTS_SYSTEM_PROMPT, text)
            .await?;
        let points = parse_key_points(&raw)?;
        Ok(EntryAnalysis {
            key_points: points,
            ..EntryAnalysis::default()
        }
        .normalized()
        .key_points)
    }
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().trim_end_matches("```").trim()
}

/// Extract the first JSON value (object or array) embedded in model output.
fn extract_json(raw: &str) -> Result<Value> {
    let text = strip_code_fence(raw);
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    warn!(
        subsystem = "inference",
        component = "analysis",
        response_len = raw.len(),
        "Model output contained no parseable JSON"
    );
    Err(Error::Inference(
        "Analysis response was not valid JSON".to_string(),
    ))
}

fn number_field(value: &Value, key: &str) -> f32 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) as f32,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Strings from an array field, or a comma-separated string field.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Parse the metadata prompt's answer. Key points are not part of it.
pub(crate) fn parse_metadata(raw: &str) -> Result<EntryAnalysis> {
    let value = extract_json(raw)?;
    if !value.is_object() {
        return Err(Error::Inference(
            "Analysis response was not a JSON object".to_string(),
        ));
    }

    Ok(EntryAnalysis {
        sentiment: number_field(&value, "sentiment"),
        emotions: string_list(value.get("emotions")),
        topics: string_list(value.get("topics").or_else(|| value.get("tags"))),
        entities: string_list(value.get("entities")),
        key_points: Vec::new(),
    }
    .normalized())
}

/// Parse the key-points prompt's answer: `{"keyPoints": [...]}` or a bare
/// array.
pub(crate) fn parse_key_points(raw: &str) -> Result<Vec<String>> {
    let value = extract_json(raw)?;
    let list = match &value {
        Value::Array(_) => Some(&value),
        Value::Object(_) => value
            .get("keyPoints")
            .or_else(|| value.get("key_points")),
        _ => None,
    };
    Ok(string_list(list))
}
