//! # Job Completion
//!
//! Completion queue, the worker that drains it, and the recovery scanner that
//! refills it from persisted completion flags.

pub mod queue;
pub mod recovery;
pub mod worker;

pub use queue::{completion_queue, CompletionHandle, CompletionQueue};
pub use recovery::RecoveryScanner;
pub use worker::{CompletionOutcome, CompletionWorker, ConfirmationBackoff};
