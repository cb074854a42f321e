//! Blob storage for audio objects.
//!
//! Objects are opaque byte buffers addressed by `/`-separated keys such as
//! `entries/{entryId}/originals/{timestamp}-{filename}`. Retrieval happens
//! through time-limited HMAC-signed URLs served by the API's `/blobs` route.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use journal_core::{validate_blob_key, Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// A retrieval URL valid until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Storage backend trait for blob storage.
///
/// Allows abstracting over filesystem, S3, or other storage providers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read the object under `key`. Fails with `NotFound` if absent.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete the object under `key`. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Time-limited retrieval URL for `key`.
    fn signed_url(&self, key: &str) -> Result<SignedUrl>;

    /// Verify a presented signature for `key`. Fails with `Forbidden` when the
    /// signature is wrong or expired.
    fn verify_signature(&self, key: &str, expires: i64, signature: &str) -> Result<()>;
}

// =============================================================================
// URL SIGNING
// =============================================================================

/// Issues and verifies `{base}/blobs/{key}?expires={unix}&signature={hex}` URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
    ttl: Duration,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl,
        }
    }

    /// Signer with a random per-process secret. URLs stop verifying after a
    /// restart.
    pub fn ephemeral(base_url: impl Into<String>, ttl: Duration) -> Self {
        let secret: [u8; 32] = rand::random();
        Self::new(secret.to_vec(), base_url, ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Internal(format!("invalid signing key: {}", e)))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Sign `key` relative to `now`.
    pub fn sign_at(&self, key: &str, now: DateTime<Utc>) -> Result<SignedUrl> {
        validate_blob_key(key)?;
        let expires_at = now + chrono::Duration::seconds(self.ttl.as_secs() as i64);
        let expires = expires_at.timestamp();
        let signature = hex::encode(self.mac(key, expires)?.finalize().into_bytes());
        Ok(SignedUrl {
            url: format!(
                "{}/blobs/{}?expires={}&signature={}",
                self.base_url, key, expires, signature
            ),
            expires_at,
        })
    }

    pub fn sign(&self, key: &str) -> Result<SignedUrl> {
        self.sign_at(key, Utc::now())
    }

    /// Verify a signature relative to `now`.
    pub fn verify_at(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if now.timestamp() > expires {
            return Err(Error::Forbidden("signed URL has expired".to_string()));
        }
        let provided = hex::decode(signature)
            .map_err(|_| Error::Forbidden("malformed signature".to_string()))?;
        self.mac(key, expires)?
            .verify_slice(&provided)
            .map_err(|_| Error::Forbidden("signature mismatch".to_string()))
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<()> {
        self.verify_at(key, expires, signature, Utc::now())
    }
}

// =============================================================================
// FILESYSTEM BACKEND
// =============================================================================

/// Filesystem storage backend.
///
/// Objects are stored at `{base_path}/{key}`.
pub struct FilesystemBackend {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            base_path: base_path.into(),
            signer,
        }
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        validate_blob_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Validate that the storage backend can write, read, and delete files.
    ///
    /// Performs a full round-trip at startup to catch permission errors and
    /// missing directories early.
    pub async fn validate(&self) -> Result<()> {
        let key = ".health-check/test.bin";
        let data = b"storage-health-check";
        self.put(key, data).await?;
        let read_back = self.get(key).await?;
        if read_back != data {
            return Err(Error::Storage("health check read-back mismatch".to_string()));
        }
        self.delete(key).await?;
        let _ = fs::remove_dir(self.base_path.join(".health-check")).await;
        Ok(())
    }
}

fn storage_err(op: &str, key: &str, e: std::io::Error) -> Error {
    warn!(
        subsystem = "storage",
        component = "filesystem",
        op = op,
        blob_key = %key,
        error = %e,
        "Blob storage operation failed"
    );
    Error::Storage(format!("{} {}: {}", op, key, e))
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(key)?;
        debug!(
            subsystem = "storage",
            component = "filesystem",
            op = "put",
            blob_key = %key,
            byte_len = data.len(),
            "Writing blob"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_err("create_dir_all", key, e))?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &full_path).await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(storage_err("put", key, e));
        }

        // 0644 (rw-r--r--, no execute)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(|e| storage_err("set_permissions", key, e))?;
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(key)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Blob {} not found", key)))
            }
            Err(e) => Err(storage_err("get", key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.full_path(key)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err("delete", key, e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_path = self.full_path(key)?;
        fs::try_exists(&full_path)
            .await
            .map_err(|e| storage_err("exists", key, e))
    }

    fn signed_url(&self, key: &str) -> Result<SignedUrl> {
        self.signer.sign(key)
    }

    fn verify_signature(&self, key: &str, expires: i64, signature: &str) -> Result<()> {
        self.signer.verify(key, expires, signature)
    }
}
