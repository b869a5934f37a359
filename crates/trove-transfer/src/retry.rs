use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::TransferResult;

/// Counters shared by the transfer workers.
#[derive(Debug, Default)]
pub(crate) struct TransferStats {
    pub attempts: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
    pub deduplicated: AtomicU64,
}

/// Run `op` until it succeeds, fails with a non-retriable error, or has been
/// attempted `max_attempts` times. Attempts follow each other immediately.
pub(crate) async fn with_retry<T, F, Fut>(
    max_attempts: u32,
    stats: &TransferStats,
    url: &str,
    mut op: F,
) -> TransferResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TransferResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        stats.attempts.fetch_add(1, Ordering::Relaxed);
        match op().await {
            Ok(value) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(url, attempt, "transfer succeeded");
                return Ok(value);
            }
            Err(e) if e.is_retriable() && attempt < max_attempts => {
                warn!(url, attempt, error = %e, "transfer failed, retrying");
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(url, attempt, error = %e, "transfer failed");
                return Err(e);
            }
        }
    }
}
