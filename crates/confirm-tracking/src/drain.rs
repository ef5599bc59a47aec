//! Bounded wait for the outstanding set to drain.

use crate::OutstandingSet;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Default poll granularity.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll `outstanding` until it is empty or `timeout` elapses.
///
/// Returns the result of the last emptiness check. The set's lock is only
/// taken for the check itself, never across the sleep.
pub async fn wait_until_empty<D>(
    outstanding: &OutstandingSet<D>,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if outstanding.is_empty() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        debug!(outstanding = outstanding.len(), "Waiting for confirms to drain");
        sleep(poll_interval.min(deadline - now)).await;
    }
    outstanding.is_empty()
}
