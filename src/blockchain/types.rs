//! # Ledger Types
//!
//! Wire-level shapes exchanged with the ledger client: log filters, log
//! entries, outgoing transactions and confirmation status.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::types::{Address, TxHash};

/// Keccak-256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// The three job events tracked by the sync loop, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Funded,
    Completed,
}

impl EventKind {
    /// Processing order within a single sync iteration
    pub const ALL: [EventKind; 3] = [EventKind::Created, EventKind::Funded, EventKind::Completed];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Created => "JobCreated",
            EventKind::Funded => "JobFunded",
            EventKind::Completed => "JobCompleted",
        }
    }

    /// Canonical event signature as declared by the agent contract
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::Created => "JobCreated(address,address)",
            EventKind::Funded => "JobFunded(address)",
            EventKind::Completed => "JobCompleted(address)",
        }
    }

    /// Log topic (Keccak-256 of the signature)
    pub fn topic(&self) -> [u8; 32] {
        keccak256(self.signature().as_bytes())
    }

    /// Number of 32-byte data words the event carries
    pub fn data_words(&self) -> usize {
        match self {
            EventKind::Created => 2,
            EventKind::Funded | EventKind::Completed => 1,
        }
    }
}

/// Range query for logs emitted by one contract with one topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic: [u8; 32],
    pub from_block: u64,
    pub to_block: u64,
}

/// Log entry returned by a range query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub transaction_hash: Option<TxHash>,
    pub log_index: Option<u64>,
}

/// Outgoing contract call to be signed by the node's account manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub gas_limit: u64,
    pub data: Vec<u8>,
}

/// Confirmation state of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Known to the node but not yet in a block
    Pending,
    /// Included in a block
    Mined { block_number: u64 },
    /// The node has no record of the transaction
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_topics_are_distinct() {
        let topics: Vec<_> = EventKind::ALL.iter().map(|k| k.topic()).collect();
        assert_ne!(topics[0], topics[1]);
        assert_ne!(topics[1], topics[2]);
        assert_ne!(topics[0], topics[2]);
    }

    #[test]
    fn test_keccak_known_vector() {
        // keccak256("") from the Keccak reference
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
