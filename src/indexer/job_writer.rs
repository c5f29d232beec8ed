//! # Job Writer
//!
//! Applies decoded job events to the job store. Created and Funded events are
//! merge-upserts that only touch the fields they own; Completed deletes.

use tracing::debug;

use super::event_processor::JobEvent;
use crate::storage::JobStore;
use crate::types::{JobState, SyncResult};

/// Store writer for job events
#[derive(Clone)]
pub struct JobWriter {
    store: JobStore,
}

impl JobWriter {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    /// Apply one event to the store
    pub fn write_event(&self, event: &JobEvent) -> SyncResult<()> {
        match *event {
            JobEvent::Created { job, consumer } => {
                debug!(job = %job, "received JobCreated event; saving to db");
                self.store.merge_job(job, |record| {
                    record.consumer = consumer;
                    record.state = record.state.advance(JobState::Pending);
                })?;
            }
            JobEvent::Funded { job } => {
                debug!(job = %job, "received JobFunded event; saving to db");
                self.store.merge_job(job, |record| {
                    record.state = record.state.advance(JobState::Funded);
                })?;
            }
            JobEvent::Completed { job } => {
                debug!(job = %job, "received JobCompleted event; deleting from db");
                self.store.delete_job(&job)?;
            }
        }
        Ok(())
    }
}
