//! # Job Sync Node
//!
//! Keeps a local, queryable mirror of agent-contract jobs and drives their
//! on-chain completion. Three routines cooperate through a RocksDB job store
//! and an in-memory completion queue:
//! - the event sync loop mirrors `JobCreated`/`JobFunded`/`JobCompleted` logs
//! - the completion worker submits `completeJob` and waits for it to be mined
//! - the recovery scanner re-queues persisted but unconfirmed completions

pub mod blockchain;
pub mod completion;
pub mod config;
pub mod context;
pub mod indexer;
pub mod processor;
pub mod shutdown;
pub mod storage;
pub mod types;

pub use types::{Address, CompletionRequest, Job, JobSignature, JobState, SyncError, SyncResult, TxHash};

pub use blockchain::{AgentContract, JobContract, JsonRpcLedger, LedgerClient};
pub use completion::{CompletionHandle, CompletionWorker, RecoveryScanner};
pub use config::{CheckpointPolicy, SyncConfig};
pub use context::{ProcessorStats, SyncContext};
pub use indexer::{EventSync, IterationOutcome};
pub use processor::Processor;
pub use storage::JobStore;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Install the default `tracing` subscriber (`RUST_LOG`, falling back to `info`)
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
