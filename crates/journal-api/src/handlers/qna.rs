//! Question answering over journal entries.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use journal_core::defaults;

use crate::services::QnaAnswer;
use crate::{ApiError, AppState};

/// Request body for `POST /entries/search/qna`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QnaRequest {
    /// Missing and blank questions are both rejected by the orchestrator.
    #[serde(default)]
    pub question: String,
    pub top_k: Option<usize>,
}

/// Answer a question from the most similar entry chunks.
///
/// # Returns
/// - 200 OK with `{answer, context}` where `context` holds the raw matches
/// - 400 Bad Request if the question is missing or blank
/// - 503 if the vector index has not been initialized
pub async fn answer_question(
    State(state): State<AppState>,
    body: Result<Json<QnaRequest>, JsonRejection>,
) -> Result<Json<QnaAnswer>, ApiError> {
    let Json(req) = body?;
    let top_k = req
        .top_k
        .unwrap_or(defaults::QNA_TOP_K)
        .clamp(1, defaults::QNA_TOP_K_MAX);
    let answer = state
        .orchestrator
        .answer_question(&req.question, top_k)
        .await?;
    Ok(Json(answer))
}
