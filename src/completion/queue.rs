//! Bounded FIFO of completion requests.
//!
//! The queue lives only in memory. Durability comes from the
//! `completionRequested` flag on the job record, which is written before a
//! request is enqueued and re-read by the recovery scanner on restart.

use tokio::sync::mpsc;
use tracing::debug;

use crate::storage::JobStore;
use crate::types::{Address, CompletionRequest, JobSignature, SyncError, SyncResult};

/// Create a linked producer handle and consumer queue
pub fn completion_queue(capacity: usize, store: JobStore) -> (CompletionHandle, CompletionQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CompletionHandle { tx, store }, CompletionQueue { rx })
}

/// Producer side: cloned into the recovery scanner and handed to external callers
#[derive(Clone)]
pub struct CompletionHandle {
    tx: mpsc::Sender<CompletionRequest>,
    store: JobStore,
}

impl CompletionHandle {
    /// Enqueue a request, waiting while the queue is full
    pub async fn enqueue(&self, request: CompletionRequest) -> SyncResult<()> {
        debug!(job = %request.job_address, "enqueueing completion request");
        self.tx.send(request).await.map_err(|_| SyncError::Shutdown)
    }

    /// Persist a completion request on the job record, then enqueue it.
    ///
    /// The job must already have been observed on the ledger. A malformed
    /// signature is rejected before anything is written.
    pub async fn request_completion(&self, job: Address, signature: Vec<u8>) -> SyncResult<()> {
        JobSignature::parse(&signature)?;
        self.store.request_completion(job, signature.clone())?;
        self.enqueue(CompletionRequest {
            job_address: job,
            signature,
        })
        .await
    }

    /// Free slots left in the queue
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer side, owned by the completion worker
pub struct CompletionQueue {
    rx: mpsc::Receiver<CompletionRequest>,
}

impl CompletionQueue {
    /// Next request in arrival order; `None` once every handle is dropped
    pub async fn recv(&mut self) -> Option<CompletionRequest> {
        self.rx.recv().await
    }
}
