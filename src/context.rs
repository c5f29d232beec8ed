//! # Sync Context
//!
//! Process-scoped handles shared by the sync loop, completion worker and
//! recovery scanner. Built once at startup and read-only afterwards, apart
//! from the statistics behind their own lock.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::blockchain::{AgentContract, JobContract, JsonRpcLedger, LedgerClient};
use crate::config::SyncConfig;
use crate::storage::JobStore;
use crate::types::{Address, SyncResult};

/// Counters reported by the running routines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub iterations: u64,
    pub events_applied: u64,
    pub events_dropped: u64,
    pub query_failures: u64,
    pub checkpoint: Option<u64>,
    pub completions_submitted: u64,
    pub completions_confirmed: u64,
    pub completions_failed: u64,
    pub completions_recovered: u64,
}

/// Shared state for the sync routines
pub struct SyncContext {
    pub config: SyncConfig,
    pub contract_address: Address,
    pub ledger: Arc<dyn LedgerClient>,
    pub contract: Arc<dyn JobContract>,
    pub store: JobStore,
    pub stats: Arc<RwLock<ProcessorStats>>,
}

impl SyncContext {
    /// Assemble a context from already-constructed collaborators
    pub fn new(
        config: SyncConfig,
        ledger: Arc<dyn LedgerClient>,
        contract: Arc<dyn JobContract>,
        store: JobStore,
    ) -> SyncResult<Self> {
        config.validate()?;
        let contract_address = config.agent_contract_address()?;

        Ok(Self {
            config,
            contract_address,
            ledger,
            contract,
            store,
            stats: Arc::new(RwLock::new(ProcessorStats::default())),
        })
    }

    /// Build the JSON-RPC ledger, agent contract binding and RocksDB store
    /// described by `config`
    pub fn from_config(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;

        let ledger: Arc<dyn LedgerClient> = Arc::new(JsonRpcLedger::new(&config.ethereum.rpc_url)?);
        let contract: Arc<dyn JobContract> = Arc::new(AgentContract::new(
            ledger.clone(),
            config.agent_contract_address()?,
            config.account_address()?,
        ));
        let store = JobStore::open(&config.storage)?;

        Self::new(config, ledger, contract, store)
    }
}
