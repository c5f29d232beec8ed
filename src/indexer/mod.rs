//! # Job Event Sync
//!
//! Polls the ledger for agent-contract events, merges them into the job store
//! and advances a durable checkpoint so a restart resumes where the last
//! completed scan left off.

pub mod event_processor;
pub mod job_writer;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

pub use event_processor::{EventProcessor, JobEvent};
pub use job_writer::JobWriter;

use crate::blockchain::types::{EventKind, LogEntry, LogFilter};
use crate::config::CheckpointPolicy;
use crate::context::SyncContext;
use crate::shutdown::Shutdown;
use crate::types::{SyncError, SyncResult};

/// Result of a single sync iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Current height could not be read; nothing changed
    HeightUnavailable,
    /// Checkpoint could not be read; nothing changed
    StoreUnavailable,
    /// Checkpoint is already at or past the current height
    UpToDate { checkpoint: u64 },
    /// `[from, to]` was scanned
    Scanned {
        from: u64,
        to: u64,
        failed: Vec<EventKind>,
        checkpoint_advanced: bool,
    },
}

/// Per-kind result within one iteration
#[derive(Debug, Default)]
struct KindReport {
    applied: u64,
    dropped: u64,
    /// Query or database failure; the range must be re-scanned to recover
    retryable: bool,
}

/// Event synchronization loop
pub struct EventSync {
    ctx: Arc<SyncContext>,
    processor: EventProcessor,
    writer: JobWriter,
}

impl EventSync {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        let writer = JobWriter::new(ctx.store.clone());
        Self {
            ctx,
            processor: EventProcessor::new(),
            writer,
        }
    }

    /// Run iterations on the poll interval until shutdown
    pub async fn run(self, mut shutdown: Shutdown) {
        let interval = self.ctx.config.poll_interval();
        info!(
            contract = %self.ctx.contract_address,
            interval_ms = interval.as_millis() as u64,
            "Starting job event sync"
        );

        while !shutdown.is_triggered() {
            tokio::select! {
                outcome = self.run_iteration() => {
                    debug!(?outcome, "sync iteration finished");
                }
                _ = shutdown.wait() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.wait() => break,
            }
        }

        info!("Job event sync stopped");
    }

    /// Scan `[checkpoint + 1, current]` once and merge what was found
    pub async fn run_iteration(&self) -> IterationOutcome {
        self.ctx.stats.write().await.iterations += 1;

        let current = match self.ctx.ledger.current_height().await {
            Ok(height) => height,
            Err(e) => {
                error!(error = %e, "error determining current block");
                return IterationOutcome::HeightUnavailable;
            }
        };

        let checkpoint = match self.ctx.store.checkpoint() {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                error!(error = %e, "error reading checkpoint");
                return IterationOutcome::StoreUnavailable;
            }
        };

        // An absent checkpoint means "start watching from the current block"
        let from = match checkpoint {
            Some(last) => last.saturating_add(1),
            None => current,
        };

        if from > current {
            return IterationOutcome::UpToDate {
                checkpoint: checkpoint.unwrap_or(current),
            };
        }

        let mut failed = Vec::new();
        let mut hold = false;
        let mut applied = 0;
        let mut dropped = 0;

        for kind in EventKind::ALL {
            let report = match self.fetch_logs(kind, from, current).await {
                Ok(logs) => self.apply_logs(kind, &logs),
                Err(e) => {
                    error!(event = kind.name(), from, to = current, error = %e, "error getting job logs");
                    failed.push(kind);
                    KindReport {
                        retryable: true,
                        ..Default::default()
                    }
                }
            };
            applied += report.applied;
            dropped += report.dropped;
            hold |= report.retryable;
        }

        let policy = self.ctx.config.sync.checkpoint_policy;
        let advance = !hold || policy == CheckpointPolicy::AdvanceAlways;

        let mut checkpoint_advanced = false;
        if advance {
            match self.ctx.store.advance_checkpoint(current) {
                Ok(stored) => {
                    checkpoint_advanced = true;
                    self.ctx.stats.write().await.checkpoint = Some(stored);
                }
                Err(e) => error!(height = current, error = %e, "error putting current block to db"),
            }
        } else {
            warn!(from, to = current, ?failed, "holding checkpoint; range will be re-scanned");
        }

        {
            let mut stats = self.ctx.stats.write().await;
            stats.events_applied += applied;
            stats.events_dropped += dropped;
            stats.query_failures += failed.len() as u64;
        }

        IterationOutcome::Scanned {
            from,
            to: current,
            failed,
            checkpoint_advanced,
        }
    }

    /// Query one event kind over `[from, to]`, split into chunks if configured
    async fn fetch_logs(&self, kind: EventKind, from: u64, to: u64) -> SyncResult<Vec<LogEntry>> {
        let chunk = self.ctx.config.sync.log_chunk_blocks;
        let topic = kind.topic();
        let mut logs = Vec::new();

        let mut start = from;
        while start <= to {
            let end = if chunk == 0 {
                to
            } else {
                start.saturating_add(chunk - 1).min(to)
            };

            let filter = LogFilter {
                address: self.ctx.contract_address,
                topic,
                from_block: start,
                to_block: end,
            };
            logs.extend(self.ctx.ledger.filter_logs(&filter).await?);

            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }

        Ok(logs)
    }

    /// Decode and merge one kind's logs in the order returned
    fn apply_logs(&self, kind: EventKind, logs: &[LogEntry]) -> KindReport {
        let mut report = KindReport::default();

        for log in logs {
            let event = match self.processor.process_log(kind, log) {
                Ok(event) => event,
                Err(e) => {
                    error!(event = kind.name(), block = log.block_number, error = %e, "error decoding job log");
                    report.dropped += 1;
                    continue;
                }
            };

            match self.writer.write_event(&event) {
                Ok(()) => report.applied += 1,
                // A stored record that no longer decodes fails the same way on every re-scan
                Err(SyncError::Serialization(e)) => {
                    error!(event = kind.name(), job = %event.job(), error = %e, "error unmarshaling stored job; event dropped");
                    report.dropped += 1;
                }
                Err(e) => {
                    error!(event = kind.name(), job = %event.job(), error = %e, "error writing job to db");
                    report.retryable = true;
                }
            }
        }

        report
    }
}
