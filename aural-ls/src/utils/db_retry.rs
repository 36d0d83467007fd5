//! Retry of label writes under SQLite lock contention
//!
//! SQLite allows one writer at a time. Concurrent label writes can see
//! "database is locked" once the busy timeout runs out; those are retried.

use crate::error::{Error, Result};
use std::time::{Duration, Instant};

const FIRST_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Run `operation` until it stops failing on lock contention or `max_wait_ms` passes
///
/// Other errors are returned as they are. Backoff doubles from 10 ms up to 1 s.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let deadline = Duration::from_millis(max_wait_ms);
    let started = Instant::now();
    let mut backoff = FIRST_BACKOFF;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempts,
                        "Write succeeded after lock retries"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => err,
            Err(err) => return Err(err),
        };

        let waited = started.elapsed();
        if waited >= deadline {
            tracing::error!(
                operation = operation_name,
                attempts,
                error = %err,
                "Giving up on locked database"
            );
            return Err(Error::StorageFailure(format!(
                "database locked after {} attempts ({} ms)",
                attempts,
                waited.as_millis()
            )));
        }

        tracing::warn!(
            operation = operation_name,
            attempts,
            backoff_ms = backoff.as_millis() as u64,
            "Database locked, retrying"
        );
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
