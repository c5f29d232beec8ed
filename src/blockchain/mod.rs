//! # Blockchain Integration
//!
//! Ledger client, contract binding and wire types for the agent contract.

pub mod client;
pub mod contracts;
pub mod types;

pub use client::{JsonRpcLedger, LedgerClient};
pub use contracts::{AgentContract, JobContract};
pub use types::*;
