//! # Completion Worker
//!
//! Drains the completion queue one request at a time: parse the signature,
//! submit `completeJob`, then wait for the transaction to leave the pending
//! state before taking the next request. At most one completion transaction
//! is ever unconfirmed: a transaction still pending after the confirmation
//! timeout keeps being polled at the maximum backoff. Only one the node no
//! longer knows about releases the worker early.
//!
//! The worker never touches the job record. The record disappears when the
//! sync loop later sees the resulting `JobCompleted` event; until then the
//! persisted flag lets the recovery scanner resubmit after a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::queue::CompletionQueue;
use crate::blockchain::types::TxStatus;
use crate::context::SyncContext;
use crate::shutdown::Shutdown;
use crate::types::{CompletionRequest, JobSignature, TxHash};

/// What happened to one completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Confirmed { tx_hash: TxHash, block_number: u64 },
    InvalidSignature,
    SubmitFailed,
    /// The node lost the transaction after the confirmation timeout
    Dropped { tx_hash: TxHash },
}

/// Exponential backoff between confirmation polls
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub timeout: Duration,
}

impl ConfirmationBackoff {
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

/// Single consumer of the completion queue
pub struct CompletionWorker {
    ctx: Arc<SyncContext>,
    queue: CompletionQueue,
    backoff: ConfirmationBackoff,
}

impl CompletionWorker {
    pub fn new(ctx: Arc<SyncContext>, queue: CompletionQueue) -> Self {
        let completion = &ctx.config.completion;
        let backoff = ConfirmationBackoff {
            initial: Duration::from_millis(completion.confirmation_initial_backoff_ms),
            max: Duration::from_millis(completion.confirmation_max_backoff_ms),
            timeout: Duration::from_secs(completion.confirmation_timeout_secs),
        };

        Self { ctx, queue, backoff }
    }

    /// Process requests in arrival order until shutdown or the queue closes
    pub async fn run(mut self, mut shutdown: Shutdown) {
        info!("Starting completion worker");

        loop {
            let request = tokio::select! {
                request = self.queue.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
                _ = shutdown.wait() => break,
            };

            tokio::select! {
                outcome = self.process(&request) => {
                    debug!(job = %request.job_address, ?outcome, "completion request finished");
                }
                _ = shutdown.wait() => {
                    warn!(job = %request.job_address, "shutdown during completion; recovery will resubmit on restart");
                    break;
                }
            }
        }

        info!("Completion worker stopped");
    }

    /// Submit one completion and wait for it to be mined
    pub async fn process(&self, request: &CompletionRequest) -> CompletionOutcome {
        let job = request.job_address;
        let signature_hex = hex::encode(&request.signature);

        let signature = match JobSignature::parse(&request.signature) {
            Ok(signature) => signature,
            Err(e) => {
                error!(job = %job, signature = %signature_hex, error = %e, "error parsing job signature");
                self.ctx.stats.write().await.completions_failed += 1;
                return CompletionOutcome::InvalidSignature;
            }
        };

        debug!(job = %job, signature = %signature_hex, "submitting transaction to complete job");
        let gas_limit = self.ctx.config.ethereum.gas_limit;
        let tx_hash = match self
            .ctx
            .contract
            .complete_job(job, signature.v, signature.r, signature.s, gas_limit)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                error!(job = %job, error = %e, "error submitting transaction to complete job");
                self.ctx.stats.write().await.completions_failed += 1;
                return CompletionOutcome::SubmitFailed;
            }
        };
        self.ctx.stats.write().await.completions_submitted += 1;

        let outcome = self.wait_for_confirmation(tx_hash).await;
        match &outcome {
            CompletionOutcome::Confirmed { block_number, .. } => {
                info!(job = %job, tx = %tx_hash, block = block_number, "completion transaction mined");
                self.ctx.stats.write().await.completions_confirmed += 1;
            }
            _ => {
                self.ctx.stats.write().await.completions_failed += 1;
            }
        }
        outcome
    }

    /// Poll the transaction with exponential backoff until it is mined.
    ///
    /// Past the timeout a pending transaction is still waited on, at the
    /// maximum backoff; an unknown one is given up on.
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> CompletionOutcome {
        let started = Instant::now();
        let mut delay = self.backoff.initial;
        let mut overdue = false;

        loop {
            let timed_out = started.elapsed() >= self.backoff.timeout;

            match self.ctx.ledger.transaction_status(tx_hash).await {
                Ok(TxStatus::Mined { block_number }) => {
                    return CompletionOutcome::Confirmed { tx_hash, block_number };
                }
                Ok(TxStatus::Unknown) if timed_out => {
                    error!(
                        tx = %tx_hash,
                        waited_secs = started.elapsed().as_secs(),
                        "completion transaction unknown to the node after timeout; dropping"
                    );
                    return CompletionOutcome::Dropped { tx_hash };
                }
                Ok(status) => debug!(tx = %tx_hash, ?status, "completion transaction not mined yet"),
                Err(e) => warn!(tx = %tx_hash, error = %e, "error polling completion transaction"),
            }

            if timed_out && !overdue {
                warn!(
                    tx = %tx_hash,
                    waited_secs = started.elapsed().as_secs(),
                    "completion transaction not mined before timeout; still waiting"
                );
                overdue = true;
                delay = self.backoff.max;
            }

            tokio::time::sleep(delay).await;
            delay = self.backoff.next_delay(delay);
        }
    }
}
