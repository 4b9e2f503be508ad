//! Retry helpers shared by the HTTP-backed providers and the documentation
//! retriever.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;

/// Returns `true` if the HTTP status code is transient and worth retrying.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Exponential backoff with +/-25% jitter and a 100ms floor.
///
/// attempt 0 is about 1s, attempt 1 about 2s, attempt 2 about 4s.
pub(crate) fn retry_backoff_delay(attempt: u32) -> Duration {
    let base_ms: u64 = 1000u64.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_range = base_ms / 4;
    let jitter = if jitter_range > 0 {
        let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
        offset as i64 - jitter_range as i64
    } else {
        0
    };
    Duration::from_millis((base_ms as i64 + jitter).max(100) as u64)
}

fn is_retryable(err: &LlmError) -> bool {
    match err {
        LlmError::RateLimited { .. } | LlmError::Timeout { .. } => true,
        LlmError::RequestFailed { reason, .. } => reason
            .strip_prefix("HTTP ")
            .and_then(|rest| rest.get(..3))
            .and_then(|code| code.parse::<u16>().ok())
            .is_none_or(is_retryable_status),
        _ => false,
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `max_retries` retries have been spent.
pub(crate) async fn with_retries<T, F, Fut>(
    provider: &str,
    max_retries: u32,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries && is_retryable(&err) => {
                let delay = match &err {
                    LlmError::RateLimited {
                        retry_after: Some(after),
                        ..
                    } => *after,
                    _ => retry_backoff_delay(attempt),
                };
                tracing::warn!(
                    provider,
                    attempt = attempt + 1,
                    max_retries,
                    ?delay,
                    "Retrying LLM request: {}",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_is_retryable_status() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [200, 400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(status));
        }
    }

    #[test]
    fn test_retry_backoff_delay_growth() {
        for _ in 0..20 {
            let d0 = retry_backoff_delay(0).as_millis();
            let d2 = retry_backoff_delay(2).as_millis();
            assert!((750..=1250).contains(&d0), "attempt 0: {d0}");
            assert!((3000..=5000).contains(&d2), "attempt 2: {d2}");
        }
    }

    #[test]
    fn test_classification() {
        let http = |code: &str| LlmError::RequestFailed {
            provider: "x".to_string(),
            reason: format!("HTTP {code} Bad: body"),
        };
        assert!(is_retryable(&http("503")));
        assert!(!is_retryable(&http("400")));
        assert!(!is_retryable(&LlmError::AuthFailed {
            provider: "x".to_string()
        }));
    }

    #[tokio::test]
    async fn test_with_retries_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), LlmError> = with_retries("x", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LlmError::AuthFailed {
                    provider: "x".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retries_honours_retry_after() {
        let calls = AtomicU32::new(0);
        let result = with_retries("x", 2, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(LlmError::RateLimited {
                        provider: "x".to_string(),
                        retry_after: Some(Duration::from_millis(5)),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }
}
