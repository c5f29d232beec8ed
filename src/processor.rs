//! # Processor
//!
//! Owns the sync context and the three long-running routines:
//! - completion worker (started first so recovered requests always drain)
//! - startup recovery scan (awaited before `start` returns)
//! - job event sync loop
//! - optional periodic recovery scan

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::completion::{completion_queue, CompletionHandle, CompletionQueue, CompletionWorker, RecoveryScanner};
use crate::context::{ProcessorStats, SyncContext};
use crate::indexer::EventSync;
use crate::shutdown::{self, ShutdownTrigger};
use crate::storage::JobStore;
use crate::types::{SyncError, SyncResult};

/// Background processing for job events and completions
pub struct Processor {
    ctx: Arc<SyncContext>,
    handle: CompletionHandle,
    queue: Mutex<Option<CompletionQueue>>,
    shutdown: ShutdownTrigger,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Processor {
    pub fn new(ctx: SyncContext) -> Self {
        let (handle, queue) = completion_queue(ctx.config.completion.queue_capacity, ctx.store.clone());
        let (shutdown, _) = shutdown::channel();

        Self {
            ctx: Arc::new(ctx),
            handle,
            queue: Mutex::new(Some(queue)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the routines. A disabled processor logs and returns.
    ///
    /// The startup recovery scan has finished enqueueing by the time this
    /// returns, so requests recovered from the store precede any submitted
    /// through [`completion_handle`](Self::completion_handle) afterwards.
    pub async fn start(&self) -> SyncResult<()> {
        if !self.ctx.config.sync.enabled {
            warn!("Job sync processor is disabled, not starting");
            return Ok(());
        }

        let queue = self
            .queue
            .lock()
            .await
            .take()
            .ok_or_else(|| SyncError::Config("processor already started".to_string()))?;

        info!("Starting job sync processor...");
        let mut tasks = self.tasks.lock().await;

        let worker = CompletionWorker::new(self.ctx.clone(), queue);
        tasks.push(tokio::spawn(worker.run(self.shutdown.subscribe())));

        let recovery = RecoveryScanner::new(self.ctx.clone(), self.handle.clone());
        match recovery.scan().await {
            Ok(count) => info!(count, "startup recovery scan complete"),
            Err(e) => error!(error = %e, "startup recovery scan failed"),
        }

        let sync = EventSync::new(self.ctx.clone());
        tasks.push(tokio::spawn(sync.run(self.shutdown.subscribe())));

        if let Some(interval) = self.ctx.config.recovery_interval() {
            tasks.push(tokio::spawn(recovery.run_periodic(interval, self.shutdown.subscribe())));
        }

        info!("Job sync processor running");
        Ok(())
    }

    /// Signal every routine to stop and wait for them to exit
    pub async fn stop(&self) {
        info!("Job sync processor stopping...");
        self.shutdown.trigger();

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "sync task ended abnormally");
            }
        }

        if let Err(e) = self.ctx.store.flush() {
            error!(error = %e, "error flushing job store");
        }
        info!("Job sync processor stopped");
    }

    /// Producer handle for external completion requests
    pub fn completion_handle(&self) -> CompletionHandle {
        self.handle.clone()
    }

    /// Read access to the mirrored jobs and checkpoint
    pub fn store(&self) -> &JobStore {
        &self.ctx.store
    }

    /// Snapshot of the routine counters
    pub async fn stats(&self) -> ProcessorStats {
        self.ctx.stats.read().await.clone()
    }
}
