//! Centralized default constants for the journal backend.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates should reference these constants instead of defining their own
//! magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section.

// =============================================================================
// CHUNKING
// =============================================================================

/// Approximate token budget per text chunk.
pub const CHUNK_APPROX_TOKENS: usize = 500;

/// Token-to-character heuristic used to size chunk windows.
pub const CHARS_PER_TOKEN: usize = 4;

/// Characters of chunk text kept as the human-readable snippet.
pub const SNIPPET_CHARS: usize = 100;

// =============================================================================
// EMBEDDING / GENERATION
// =============================================================================

/// Default embedding model name (OpenAI-compatible).
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension for text-embedding-3-small.
pub const EMBED_DIMENSION: usize = 1536;

/// Default chat completion model.
pub const GEN_MODEL: &str = "gpt-4o-mini";

/// Default number of chunks retrieved for question answering.
pub const QNA_TOP_K: usize = 3;

/// Upper bound accepted for a caller-supplied `topK`.
pub const QNA_TOP_K_MAX: usize = 20;

/// Table owned by the pgvector embedding index.
pub const EMBEDDING_TABLE: &str = "journal_embedding";

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for entry listing.
pub const PAGE_LIMIT: i64 = 20;

/// Upper bound accepted for a caller-supplied page size.
pub const PAGE_LIMIT_MAX: i64 = 100;

// =============================================================================
// SERVER
// =============================================================================

/// Default bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP port.
pub const SERVER_PORT: u16 = 3000;

/// Maximum accepted request body for audio uploads (50 MiB).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Default CORS origins when `ALLOWED_ORIGINS` is unset.
pub const ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Deadline for a single adapter call (transcription, analysis, embedding,
/// completion, blob store) in seconds.
pub const ADAPTER_TIMEOUT_SECS: u64 = 120;

/// Deadline for an entire concatenation workflow in seconds.
pub const CONCAT_TIMEOUT_SECS: u64 = 300;

/// Default HTTP client timeout for OpenAI-compatible APIs in seconds.
pub const OPENAI_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// BLOB STORAGE
// =============================================================================

/// Default base directory for stored blobs.
pub const BLOB_STORAGE_PATH: &str = "./data/blobs";

/// Default public base URL used when signing blob URLs.
pub const BLOB_URL_BASE: &str = "http://localhost:3000";

/// Lifetime of a signed blob URL in seconds.
pub const SIGNED_URL_TTL_SECS: u64 = 3600;

/// Default ffmpeg binary.
pub const FFMPEG_PATH: &str = "ffmpeg";

/// Container for merges that mix formats and have to be re-encoded.
pub const MERGED_AUDIO_EXTENSION: &str = "m4a";

/// Accepted audio upload extensions (lowercase, without dot).
pub const ALLOWED_AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "mp4", "aac"];

/// Accepted declared MIME types for audio uploads.
pub const ALLOWED_AUDIO_MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/wav",
    "audio/m4a",
    "audio/mp4",
    "audio/x-m4a",
    "audio/aac",
    "application/octet-stream",
];

// =============================================================================
// IDENTITY PLACEHOLDER
// =============================================================================

/// Email of the implicit single user.
pub const DEFAULT_USER_EMAIL: &str = "default@example.com";

/// Placeholder password hash of the implicit single user.
pub const DEFAULT_USER_PASSWORD_HASH: &str = "default_hash_for_testing_only";

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum pool connections.
pub const POOL_MAX_CONNECTIONS: u32 = 10;

/// Default connection acquire timeout in seconds.
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";
pub const ENV_DATABASE_ACQUIRE_TIMEOUT_SECS: &str = "DATABASE_ACQUIRE_TIMEOUT_SECS";
pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_BLOB_STORAGE_PATH: &str = "BLOB_STORAGE_PATH";
pub const ENV_BLOB_URL_BASE: &str = "BLOB_URL_BASE";
pub const ENV_BLOB_SIGNING_SECRET: &str = "BLOB_SIGNING_SECRET";
pub const ENV_BLOB_URL_TTL_SECS: &str = "BLOB_URL_TTL_SECS";
pub const ENV_SCRATCH_DIR: &str = "SCRATCH_DIR";
pub const ENV_FFMPEG_PATH: &str = "FFMPEG_PATH";
pub const ENV_ADAPTER_TIMEOUT_SECS: &str = "ADAPTER_TIMEOUT_SECS";
pub const ENV_CONCAT_TIMEOUT_SECS: &str = "CONCAT_TIMEOUT_SECS";
pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
pub const ENV_MAX_UPLOAD_BYTES: &str = "MAX_UPLOAD_BYTES";

pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_EMBED_MODEL: &str = "OPENAI_EMBED_MODEL";
pub const ENV_OPENAI_GEN_MODEL: &str = "OPENAI_GEN_MODEL";
pub const ENV_OPENAI_EMBED_DIM: &str = "OPENAI_EMBED_DIM";
pub const ENV_OPENAI_TIMEOUT: &str = "OPENAI_TIMEOUT";

pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";

/// Default OpenAI-compatible API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Whisper-compatible transcription service base URL.
pub const WHISPER_BASE_URL: &str = "https://api.openai.com";

/// Default Whisper model name.
pub const WHISPER_MODEL: &str = "whisper-1";
