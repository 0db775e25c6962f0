use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Run `op`, retrying transient failures with exponential backoff
/// (1s, 2s, 4s, ... = 2^attempt). Non-transient errors and the final
/// attempt's error are returned as-is. The sleep is local to this future,
/// so concurrently running pipelines keep making progress.
pub async fn with_backoff<T, F, Fut>(op_name: &str, max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let wait = Duration::from_secs(1u64 << attempt);
                warn!(
                    "{op_name}: retry {}/{} after error: {e}. Waiting {}s...",
                    attempt + 1,
                    max_attempts,
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::cell::Cell;

    fn transient() -> AppError {
        AppError::Storage { status: 503, message: "unavailable".to_string() }
    }

    #[tokio::test(start_paused = true)]
    async fn two_transient_failures_then_success() {
        let calls = Cell::new(0u32);
        let started = tokio::time::Instant::now();

        let value = with_backoff("test", 5, || async {
            calls.set(calls.get() + 1);
            if calls.get() <= 2 {
                Err(transient())
            } else {
                Ok(calls.get())
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.get(), 3);
        // Two backoff sleeps of increasing duration: 1s then 2s.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_surface_the_last_error() {
        let calls = Cell::new(0u32);
        let started = tokio::time::Instant::now();

        let err = with_backoff("test", 3, || async {
            calls.set(calls.get() + 1);
            Err::<(), _>(transient())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Storage { status: 503, .. }));
        assert_eq!(calls.get(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_errors_fail_immediately() {
        let calls = Cell::new(0u32);

        let err = with_backoff("test", 5, || async {
            calls.set(calls.get() + 1);
            Err::<(), _>(AppError::Storage { status: 401, message: "unauthorized".to_string() })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Storage { status: 401, .. }));
        assert_eq!(calls.get(), 1);
    }
}
