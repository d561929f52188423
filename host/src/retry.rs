//! Local retry for `concurrent-update` (§7: "Retried locally up to N times
//! with exponential backoff; only surfaced after retries exhaust"). No new
//! dependency: `reqpool` reaches for the `backoff` crate for its own
//! connection-retry loop, but this one is a fixed small N with a plain
//! `tokio::time::sleep`, matching the scale of the problem (a handful of
//! CAS retries on a single row, not an open-ended connection backoff).

use sched_lib::error::SchedError;
use std::future::Future;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_millis(20);

/// Calls `f` repeatedly while it fails with `ConcurrentUpdate`, sleeping
/// `BASE_DELAY * 2^attempt` between tries, up to [`MAX_ATTEMPTS`].
pub async fn retry_on_concurrent_update<T, F, Fut>(mut f: F) -> Result<T, SchedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SchedError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(SchedError::ConcurrentUpdate(row)) if attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(BASE_DELAY * 2u32.pow(attempt)).await;
                tracing::debug!(row, attempt, "retrying after concurrent-update");
            }
            Err(e) => return Err(e),
        }
    }
}
