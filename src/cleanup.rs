//! Scheduled cleanup of expired keys and idle limiter state.

use crate::db::Database;
use crate::rate_limit::{CustomerLimiter, IpLimiters};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, ip_limiters: &IpLimiters, customer_limiter: &CustomerLimiter) {
    match db.api_keys().delete_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired API keys", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired API keys: {}", e),
    }

    let pruned = customer_limiter.prune_expired();
    if pruned > 0 {
        debug!("Pruned {} stale rate limit windows", pruned);
    }

    ip_limiters.retain_recent();
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    db: Database,
    ip_limiters: Arc<IpLimiters>,
    customer_limiter: Arc<CustomerLimiter>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately and startup already cleaned up.
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(&db, &ip_limiters, &customer_limiter).await;
        }
    })
}
