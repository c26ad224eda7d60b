//! Retry executor for repository operations.

use std::future::Future;

use storehouse_core::retry::RetryPolicy;

use crate::db::RepositoryError;

/// Run `operation` until it succeeds, fails permanently, or `policy` runs
/// out of attempts. Only [`RepositoryError::is_transient`] failures are
/// retried.
///
/// # Errors
///
/// Returns the last error from `operation`.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    label: &'static str,
    mut operation: F,
) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = label, attempt, "Retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() => {
                let Some(delay) = policy.delay_after(attempt) else {
                    tracing::error!(
                        operation = label,
                        attempts = attempt,
                        error = %e,
                        "Giving up after transient failures"
                    );
                    return Err(e);
                };
                tracing::warn!(
                    operation = label,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn transient() -> RepositoryError {
        RepositoryError::Database(sqlx::Error::PoolTimedOut)
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);

        let result = retry_transient(RetryPolicy::immediate(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err(transient()) } else { Ok(n) } }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_transient(RetryPolicy::immediate(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_transient(RetryPolicy::immediate(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RepositoryError::Conflict("cart_items_pkey".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
