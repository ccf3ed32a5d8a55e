//! Retry/backoff wrapper — retries a single transport call on transient
//! failure.
//!
//! Transient means rate limiting, server busy, connection reset, timeout,
//! or DNS failure (see `JobClawError::is_transient`). Everything else is
//! returned immediately: retrying a bad recipient or revoked credentials
//! only burns quota. After the budget is exhausted the last error is
//! returned unchanged.

use std::future::Future;
use std::time::Duration;

use jobclaw_core::error::Result;

/// Total attempts, including the first one.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff before the second attempt; doubles after each failure (2s, 4s).
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Run `op`, retrying transient failures with exponential backoff.
pub async fn with_backoff<T, F, Fut>(label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    "⚠️ {label}: attempt {attempt}/{MAX_ATTEMPTS} failed ({e}), retrying in {}s",
                    backoff.as_secs()
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!("⚠️ {label}: retry budget exhausted after {attempt} attempts");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobclaw_core::error::JobClawError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = with_backoff("send", move || {
            let calls = calls2.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err(JobClawError::transport_transient("451 try later"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<()> = with_backoff("send", move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(JobClawError::transport_transient("connection reset"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<()> = with_backoff("send", move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(JobClawError::transport_permanent("550 no such user"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
