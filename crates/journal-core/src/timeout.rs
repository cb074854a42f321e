//! Deadline wrapper for calls to external collaborators.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{Error, Result};

/// Run `fut` with a deadline. Expiry surfaces as [`Error::Timeout`] naming
/// `operation`, so callers can tell a hung adapter apart from a failed one.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                subsystem = "ingest",
                op = operation,
                timeout_secs = limit.as_secs(),
                "External call timed out"
            );
            Err(Error::Timeout {
                operation: operation.to_string(),
                secs: limit.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires() {
        let result: Result<()> = with_timeout("transcribe", Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        match result {
            Err(Error::Timeout { operation, secs }) => {
                assert_eq!(operation, "transcribe");
                assert_eq!(secs, 5);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_passes_through_value() {
        let result = with_timeout("embed", Duration::from_secs(5), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_timeout_passes_through_error() {
        let result: Result<()> = with_timeout("embed", Duration::from_secs(5), async {
            Err(Error::Embedding("boom".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::Embedding(_))));
    }
}
