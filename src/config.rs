//! # Sync Configuration
//!
//! TOML-backed configuration for the sync core. Every field has a default so a
//! partial file (or none at all) still yields a runnable config; a handful of
//! `JOBSYNC_*` environment variables override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Address, SyncError, SyncResult};

/// What to do with the checkpoint when one event-kind query fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// Keep the checkpoint where it is and re-scan the whole range next time
    #[default]
    HoldOnFailure,
    /// Advance regardless; events of the failed kind in that range are skipped
    AdvanceAlways,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub sync: SyncSettings,
    pub ethereum: EthereumConfig,
    pub completion: CompletionConfig,
    pub storage: StorageConfig,
}

/// Event synchronization loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub checkpoint_policy: CheckpointPolicy,
    /// Maximum blocks per log query; 0 queries the whole range at once
    pub log_chunk_blocks: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 5000,
            checkpoint_policy: CheckpointPolicy::default(),
            log_chunk_blocks: 2000,
        }
    }
}

/// Ledger connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EthereumConfig {
    pub rpc_url: String,
    pub agent_contract_address: String,
    /// Account that sends `completeJob` transactions
    pub account_address: String,
    pub gas_limit: u64,
}

impl Default for EthereumConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            agent_contract_address: String::new(),
            account_address: String::new(),
            gas_limit: 1_000_000,
        }
    }
}

/// Completion worker and recovery scanner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub queue_capacity: usize,
    pub confirmation_initial_backoff_ms: u64,
    pub confirmation_max_backoff_ms: u64,
    /// After this a pending transaction is polled at the maximum backoff and a
    /// transaction the node no longer knows is dropped
    pub confirmation_timeout_secs: u64,
    /// Re-run the recovery scan on this interval; 0 runs it once at startup
    pub recovery_interval_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            confirmation_initial_backoff_ms: 1000,
            confirmation_max_backoff_ms: 30_000,
            confirmation_timeout_secs: 600,
            recovery_interval_secs: 0,
        }
    }
}

/// RocksDB location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/jobsync".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> SyncResult<Self> {
        toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Override selected fields from `JOBSYNC_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("JOBSYNC_RPC_URL") {
            debug!("Overriding rpc_url from environment");
            self.ethereum.rpc_url = url;
        }
        if let Ok(addr) = std::env::var("JOBSYNC_AGENT_CONTRACT_ADDRESS") {
            self.ethereum.agent_contract_address = addr;
        }
        if let Ok(addr) = std::env::var("JOBSYNC_ACCOUNT_ADDRESS") {
            self.ethereum.account_address = addr;
        }
        if let Some(ms) = std::env::var("JOBSYNC_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.sync.poll_interval_ms = ms;
        }
        if let Ok(path) = std::env::var("JOBSYNC_DB_PATH") {
            self.storage.db_path = path;
        }
    }

    /// Check the config for values the routines cannot run with
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.poll_interval_ms == 0 {
            return Err(SyncError::Config("poll_interval_ms must be greater than 0".into()));
        }
        if self.agent_contract_address()? == Address::ZERO {
            return Err(SyncError::Config("agent_contract_address must be set".into()));
        }
        self.account_address()?;
        if self.completion.queue_capacity == 0 {
            return Err(SyncError::Config("queue_capacity must be greater than 0".into()));
        }
        if self.completion.confirmation_initial_backoff_ms > self.completion.confirmation_max_backoff_ms {
            return Err(SyncError::Config(
                "confirmation_initial_backoff_ms exceeds confirmation_max_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync.poll_interval_ms)
    }

    pub fn agent_contract_address(&self) -> SyncResult<Address> {
        self.ethereum
            .agent_contract_address
            .parse()
            .map_err(|e| SyncError::Config(format!("agent_contract_address: {}", e)))
    }

    pub fn account_address(&self) -> SyncResult<Address> {
        self.ethereum
            .account_address
            .parse()
            .map_err(|e| SyncError::Config(format!("account_address: {}", e)))
    }

    pub fn recovery_interval(&self) -> Option<Duration> {
        match self.completion.recovery_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
