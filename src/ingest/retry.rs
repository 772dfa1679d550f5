//! Exponential backoff with `Retry-After` honoring.
//!
//! Hand-rolled alongside the rate limiter for the same reason (DESIGN.md):
//! no backoff crate is grounded in the surveyed corpus.

use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::errors::CoreError;

/// Outcome of one attempt, as reported by the caller's fetch closure.
pub enum AttemptOutcome<T> {
    /// Request succeeded.
    Success(T),
    /// HTTP 404: never retried.
    NotFound,
    /// HTTP 429 or 5xx: retry after the given delay, or the schedule default if `None`.
    Retryable {
        error: String,
        retry_after: Option<Duration>,
    },
}

/// Runs `attempt` up to `config.retry_max_attempts` times, honoring the
/// configured backoff schedule (or an upstream `Retry-After` override),
/// and surfaces `UpstreamUnavailable` with accumulated attempt context on
/// exhaustion, or `NotFound` immediately.
pub async fn with_backoff<T, F, Fut>(
    config: &Config,
    endpoint: &str,
    mut attempt: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AttemptOutcome<T>>,
{
    let schedule = config.retry_backoff();
    let mut last_error = String::new();

    for attempt_no in 1..=config.retry_max_attempts {
        match attempt().await {
            AttemptOutcome::Success(value) => return Ok(value),
            AttemptOutcome::NotFound => {
                return Err(CoreError::not_found("entity", endpoint));
            }
            AttemptOutcome::Retryable { error, retry_after } => {
                last_error = error;
                if attempt_no == config.retry_max_attempts {
                    break;
                }
                let delay = retry_after.unwrap_or_else(|| {
                    schedule
                        .get((attempt_no - 1) as usize)
                        .copied()
                        .unwrap_or_else(|| *schedule.last().unwrap_or(&Duration::from_secs(8)))
                });
                warn!(
                    endpoint,
                    attempt = attempt_no,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(CoreError::upstream(
        endpoint,
        config.retry_max_attempts,
        last_error,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let config = Config {
            retry_backoff_schedule_secs: vec![0, 0, 0, 0],
            ..Config::default()
        };
        let calls = AtomicU32::new(0);
        let result = with_backoff(&config, "/x", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                AttemptOutcome::Retryable {
                    error: "503".into(),
                    retry_after: Some(Duration::from_millis(1)),
                }
            } else {
                AttemptOutcome::Success(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn not_found_never_retries() {
        let config = Config::default();
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = with_backoff(&config, "/x", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            AttemptOutcome::NotFound
        })
        .await;
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let config = Config {
            retry_backoff_schedule_secs: vec![0, 0, 0, 0],
            retry_max_attempts: 3,
            ..Config::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = with_backoff(&config, "/x", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            AttemptOutcome::Retryable {
                error: "500".into(),
                retry_after: Some(Duration::from_millis(1)),
            }
        })
        .await;
        assert!(matches!(result, Err(CoreError::UpstreamUnavailable { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
