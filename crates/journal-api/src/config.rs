//! Server configuration read from the environment.
//!
//! Every setting has a default in `journal_core::defaults`; invalid numeric
//! values are logged and replaced by the default rather than aborting startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use journal_core::defaults;

/// Process-wide server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub blob_storage_path: PathBuf,
    /// Public base URL prefixed to signed blob URLs.
    pub blob_url_base: String,
    /// HMAC secret for blob URLs. A random per-process secret is used when
    /// unset.
    pub blob_signing_secret: Option<String>,
    pub blob_url_ttl: Duration,
    /// Parent directory for concatenation scratch space (system temp dir
    /// when unset).
    pub scratch_dir: Option<PathBuf>,
    pub ffmpeg_path: String,
    pub adapter_timeout: Duration,
    pub concat_timeout: Duration,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            database_url: get(defaults::ENV_DATABASE_URL)
                .unwrap_or_else(|| "postgres://localhost/journal".to_string()),
            host: get(defaults::ENV_HOST).unwrap_or_else(|| defaults::SERVER_HOST.to_string()),
            port: parse_or(&get, defaults::ENV_PORT, defaults::SERVER_PORT),
            blob_storage_path: get(defaults::ENV_BLOB_STORAGE_PATH)
                .unwrap_or_else(|| defaults::BLOB_STORAGE_PATH.to_string())
                .into(),
            blob_url_base: get(defaults::ENV_BLOB_URL_BASE)
                .unwrap_or_else(|| defaults::BLOB_URL_BASE.to_string()),
            blob_signing_secret: get(defaults::ENV_BLOB_SIGNING_SECRET),
            blob_url_ttl: Duration::from_secs(parse_or(
                &get,
                defaults::ENV_BLOB_URL_TTL_SECS,
                defaults::SIGNED_URL_TTL_SECS,
            )),
            scratch_dir: get(defaults::ENV_SCRATCH_DIR).map(PathBuf::from),
            ffmpeg_path: get(defaults::ENV_FFMPEG_PATH)
                .unwrap_or_else(|| defaults::FFMPEG_PATH.to_string()),
            adapter_timeout: Duration::from_secs(parse_or(
                &get,
                defaults::ENV_ADAPTER_TIMEOUT_SECS,
                defaults::ADAPTER_TIMEOUT_SECS,
            )),
            concat_timeout: Duration::from_secs(parse_or(
                &get,
                defaults::ENV_CONCAT_TIMEOUT_SECS,
                defaults::CONCAT_TIMEOUT_SECS,
            )),
            allowed_origins: parse_origins(
                &get(defaults::ENV_ALLOWED_ORIGINS)
                    .unwrap_or_else(|| defaults::ALLOWED_ORIGINS.to_string()),
            ),
            max_upload_bytes: parse_or(
                &get,
                defaults::ENV_MAX_UPLOAD_BYTES,
                defaults::MAX_UPLOAD_BYTES,
            ),
        }
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> T
where
    T: FromStr + Copy,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    subsystem = "config",
                    variable = name,
                    value = %raw,
                    "Invalid value, using default"
                );
                default
            }
        },
        None => default,
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
