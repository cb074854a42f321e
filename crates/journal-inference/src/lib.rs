//! # journal-inference
//!
//! Model-provider adapters for the journal backend.
//!
//! This crate provides:
//! - OpenAI-compatible embedding and chat-completion backend
//! - Whisper-compatible transcription backend
//! - LLM-backed analysis adapter (sentiment, tags, entities, key points)
//! - Deterministic mock backends (feature `mock`)
//!
//! # Feature Flags
//!
//! - `mock`: Enable the mock backends used by downstream tests
//!
//! # Example
//!
//! ```rust,no_run
//! use journal_inference::OpenAIBackend;
//! use journal_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let texts = vec!["Hello".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

pub mod analysis;
pub mod openai;
pub mod transcription;

// Mock inference backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use journal_core::*;

pub use analysis::LlmAnalyzer;
pub use openai::{OpenAIBackend, OpenAIConfig};
pub use transcription::{
    TranscriptionBackend, TranscriptionResult, TranscriptionSegment, WhisperBackend,
    WhisperConfig,
};
