//! # Storage
//!
//! Durable state shared by the sync routines.

pub mod job_store;

pub use job_store::JobStore;
