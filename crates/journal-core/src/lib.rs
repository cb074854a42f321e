//! # journal-core
//!
//! Core types, traits, and abstractions for the journal backend.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the storage, inference, and API crates depend on. It performs no I/O
//! of its own apart from the timeout helper that wraps adapter futures.

pub mod defaults;
pub mod error;
pub mod keys;
pub mod logging;
pub mod models;
pub mod timeout;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use keys::{
    embedding_record_id, merged_audio_key, original_audio_key, validate_blob_key,
    validate_entry_id,
};
pub use models::*;
pub use timeout::with_timeout;
pub use traits::*;
