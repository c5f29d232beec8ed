//! # Core Types
//!
//! This module defines the fundamental types shared by the sync loop, the
//! completion worker and the recovery scanner.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a ledger account address in bytes
pub const ADDRESS_LEN: usize = 20;

/// Length of a completion signature (`r || s || v`) in bytes
pub const SIGNATURE_LEN: usize = 65;

/// Ledger account address (job contracts, consumers, the daemon account)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Self = Self([0u8; ADDRESS_LEN]);

    /// Build an address from a byte slice, keeping the low 20 bytes.
    ///
    /// Shorter slices are left-padded with zeros, which is how a 32-byte ABI
    /// word and a raw 20-byte key both map onto the same address.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; ADDRESS_LEN];
        if bytes.len() >= ADDRESS_LEN {
            out.copy_from_slice(&bytes[bytes.len() - ADDRESS_LEN..]);
        } else {
            out[ADDRESS_LEN - bytes.len()..].copy_from_slice(bytes);
        }
        Self(out)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Left-pad to a 32-byte ABI word
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[32 - ADDRESS_LEN..].copy_from_slice(&self.0);
        word
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s)?;
        if bytes.len() != ADDRESS_LEN {
            return Err(SyncError::Decode(format!(
                "address must be {} bytes, got {}",
                ADDRESS_LEN,
                bytes.len()
            )));
        }
        Ok(Self::from_slice(&bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Transaction hash returned by the ledger on submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s)?;
        let hash: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SyncError::Decode(format!("transaction hash must be 32 bytes: {}", s)))?;
        Ok(Self(hash))
    }
}

/// Decode a `0x`-prefixed (or bare) hex string
pub fn decode_hex(s: &str) -> Result<Vec<u8>, SyncError> {
    let trimmed = s.trim_start_matches("0x");
    hex::decode(trimmed).map_err(|e| SyncError::Decode(format!("invalid hex '{}': {}", s, e)))
}

/// Job lifecycle as observed through ledger events.
///
/// A completed job has no record at all, so there is no `Completed` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Pending,
    Funded,
}

impl JobState {
    /// Apply an observed state without ever moving backwards
    pub fn advance(self, observed: JobState) -> JobState {
        match (self, observed) {
            (JobState::Funded, _) => JobState::Funded,
            (JobState::Pending, next) => next,
        }
    }
}

/// Locally mirrored job record, keyed by `job_address`.
///
/// Unknown fields are ignored and missing ones defaulted so that records
/// written by older or newer daemons still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Job {
    pub job_address: Address,
    pub consumer: Address,
    pub state: JobState,
    pub completion_requested: bool,
    #[serde(with = "hex_bytes")]
    pub completion_signature: Vec<u8>,
}

impl Job {
    /// Pending completion request carried by this record, if any
    pub fn completion_request(&self) -> Option<CompletionRequest> {
        if self.completion_requested {
            Some(CompletionRequest {
                job_address: self.job_address,
                signature: self.completion_signature.clone(),
            })
        } else {
            None
        }
    }
}

/// In-memory request to close out a job on the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub job_address: Address,
    pub signature: Vec<u8>,
}

/// Completion signature split into its `(v, r, s)` components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSignature {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl JobSignature {
    /// Parse a 65-byte `r || s || v` signature.
    ///
    /// `v` is normalised into the 27/28 range whether the signer emitted
    /// 0/1 or 27/28.
    pub fn parse(bytes: &[u8]) -> Result<Self, SyncError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(SyncError::Decode(format!(
                "job signature must be {} bytes, got {}",
                SIGNATURE_LEN,
                bytes.len()
            )));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        let v = bytes[64] % 27 + 27;

        Ok(Self { v, r, s })
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Errors raised inside the sync core
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Job not found: {0}")]
    JobNotFound(Address),

    #[error("Shutdown in progress")]
    Shutdown,
}

impl From<rocksdb::Error> for SyncError {
    fn from(e: rocksdb::Error) -> Self {
        SyncError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Connection(e.to_string())
    }
}

/// Result type for sync core operations
pub type SyncResult<T> = Result<T, SyncError>;
