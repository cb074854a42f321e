//! OpenAI-compatible inference backend.
//!
//! Works with any endpoint that speaks the OpenAI embeddings and chat
//! completions API (OpenAI cloud, Azure OpenAI, Ollama in compatibility mode,
//! vLLM, LocalAI, LM Studio).
//!
//! # Example
//!
//! ```rust,no_run
//! use journal_inference::openai::{OpenAIBackend, OpenAIConfig};
//! use journal_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     // From environment variables
//!     let backend = OpenAIBackend::from_env().unwrap();
//!
//!     // Or with custom config
//!     let config = OpenAIConfig {
//!         base_url: "http://localhost:11434/v1".to_string(),
//!         api_key: None,
//!         embed_model: "nomic-embed-text".to_string(),
//!         gen_model: "llama3".to_string(),
//!         embed_dimension: 768,
//!         timeout_seconds: 120,
//!     };
//!     let backend = OpenAIBackend::new(config).unwrap();
//!
//!     let texts = vec!["Hello, world!".to_string()];
//!     let vectors = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::{to_journal_error, ApiCall, OpenAIErrorCode};
pub use types::*;
