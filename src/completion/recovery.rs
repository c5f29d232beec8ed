//! # Recovery Scanner
//!
//! Re-feeds completion requests that were persisted but never observed as
//! completed on the ledger. A record that is still present means the
//! `JobCompleted` event has not been seen, so resubmitting is safe: the
//! contract rejects a second completion of the same job.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::queue::CompletionHandle;
use crate::context::SyncContext;
use crate::shutdown::Shutdown;
use crate::types::SyncResult;

/// Scans the job store for unconfirmed completion requests
pub struct RecoveryScanner {
    ctx: Arc<SyncContext>,
    handle: CompletionHandle,
}

impl RecoveryScanner {
    pub fn new(ctx: Arc<SyncContext>, handle: CompletionHandle) -> Self {
        Self { ctx, handle }
    }

    /// Enqueue every flagged job once; returns how many were enqueued
    pub async fn scan(&self) -> SyncResult<usize> {
        let pending = self.ctx.store.pending_completions()?;
        let count = pending.len();

        for request in pending {
            debug!(
                job = %request.job_address,
                signature = %hex::encode(&request.signature),
                "completing old job found in db"
            );
            self.handle.enqueue(request).await?;
        }

        if count > 0 {
            info!(count, "re-queued unconfirmed completion requests");
        }
        self.ctx.stats.write().await.completions_recovered += count as u64;
        Ok(count)
    }

    /// Repeat the scan on `interval` until shutdown
    pub async fn run_periodic(self, interval: std::time::Duration, mut shutdown: Shutdown) {
        info!(interval_secs = interval.as_secs(), "Starting periodic recovery scan");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.wait() => break,
            }

            tokio::select! {
                result = self.scan() => {
                    if let Err(e) = result {
                        error!(error = %e, "recovery scan failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        info!("Periodic recovery scan stopped");
    }
}
