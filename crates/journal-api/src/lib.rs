//! # journal-api
//!
//! HTTP surface of the journal backend: audio and text ingestion, on-demand
//! summarization, retrieval-augmented Q&A, audio concatenation and signed
//! blob downloads.
//!
//! The binary in `main.rs` wires PostgreSQL, the OpenAI-compatible adapters
//! and the filesystem blob store into [`AppState`]; tests build the same
//! router over in-memory fixtures.

pub mod config;
pub mod error;
pub mod handlers;
pub mod services;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

pub use config::AppConfig;
pub use error::ApiError;
pub use state::AppState;

use handlers::{blobs, entries, health_check, qna};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Build the application router with its middleware stack.
pub fn build_router(state: AppState, config: &AppConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Entries
        .route("/entries/list", get(entries::list_entries))
        .route("/entries/search/qna", post(qna::answer_question))
        .route(
            "/entries/:id",
            get(entries::get_entry).post(entries::update_entry),
        )
        .route("/entries/:id/record-chunk", post(entries::record_chunk))
        .route("/entries/:id/summarize", post(entries::summarize_entry))
        .route("/entries/:id/concatenate", post(entries::concatenate_audio))
        .route("/entries/:id/audio", get(entries::get_entry_audio))
        // Signed blob downloads
        .route("/blobs/*key", get(blobs::get_blob))
        // Middleware
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors_layer(&config.allowed_origins))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(subsystem = "api", origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
