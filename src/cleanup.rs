//! Scheduled reclamation of expired revocation records.
//!
//! Expired records are already ignored on read; this only frees the space.

use std::time::Duration;

use tracing::{error, info};

use crate::revocation::RevocationGuard;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once. Returns the number of records removed.
pub async fn run_cleanup(revocations: &RevocationGuard) -> u64 {
    match revocations.purge_expired().await {
        Ok(count) => {
            if count > 0 {
                info!("Cleaned up {} expired revocation records", count);
            }
            count
        }
        Err(e) => {
            error!("Failed to clean up revocation records: {}", e);
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(revocations: RevocationGuard) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&revocations).await;
        }
    })
}
