//! Timeout and retry policy for provider calls.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ToolCallError {
    /// Timeouts, connection failures, rate limiting and gateway errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ToolCallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Per-request timeout plus bounded retries with linear backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
            max_retries: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Self {
        Self {
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            max_retries,
            ..Self::default()
        }
    }

    /// Run `call` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ToolCallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ToolCallError>>,
    {
        let mut attempt = 0;

        loop {
            let result = match timeout(self.request_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ToolCallError::Timeout(self.request_timeout)),
            };

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(operation, attempt, max_retries = self.max_retries, err = %e, "Retrying");
                    sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            request_timeout: Duration::from_millis(50),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ToolCallError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ToolCallError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(ToolCallError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!ToolCallError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!ToolCallError::Decode("bad json".to_string()).is_retryable());
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = fast(1)
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ToolCallError::Status { status: 503, body: String::new() })
                } else {
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast(1)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ToolCallError::Network("connection refused".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ToolCallError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast(3)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ToolCallError::Status { status: 401, body: "bad key".to_string() })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_enforced() {
        let result: Result<(), _> = fast(0)
            .run("test", || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ToolCallError::Timeout(_))));
    }
}
