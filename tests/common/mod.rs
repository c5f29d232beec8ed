//! Scripted in-memory ledger shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use jobsync_node::blockchain::types::{EventKind, LogEntry, LogFilter, TransactionRequest, TxStatus};
use jobsync_node::{
    AgentContract, Address, CheckpointPolicy, JobContract, JobStore, LedgerClient, SyncConfig, SyncContext, SyncError,
    SyncResult, TxHash,
};

pub const CONTRACT: &str = "0x00000000000000000000000000000000000000c0";
pub const ACCOUNT: &str = "0x00000000000000000000000000000000000000d0";

#[derive(Default)]
pub struct MockState {
    /// Heights handed out in order; the last one repeats
    pub heights: VecDeque<u64>,
    pub height_fails: bool,
    pub logs: Vec<LogEntry>,
    pub failing_topics: HashSet<[u8; 32]>,
    pub filter_calls: Vec<LogFilter>,
    pub sent: Vec<TransactionRequest>,
    pub send_fails_for: HashSet<Address>,
    /// Pending answers before a transaction reports mined
    pub pending_polls: u32,
    pub always_pending: bool,
    /// Report every transaction as unknown to the node
    pub drop_transactions: bool,
    pub polls: HashMap<[u8; 32], u32>,
    pub in_flight: u32,
    pub max_in_flight: u32,
    pub next_tx: u8,
}

#[derive(Default)]
pub struct MockLedger {
    pub state: Mutex<MockState>,
}

impl MockLedger {
    pub fn set_height(&self, height: u64) {
        let mut state = self.state.lock();
        state.heights.clear();
        state.heights.push_back(height);
    }

    pub fn push_log(&self, kind: EventKind, block_number: u64, words: &[Address]) {
        self.state.lock().logs.push(LogEntry {
            address: CONTRACT.parse().unwrap(),
            topics: vec![kind.topic()],
            data: words.iter().flat_map(|a| a.to_word()).collect(),
            block_number,
            ..Default::default()
        });
    }

    pub fn push_raw_log(&self, kind: EventKind, block_number: u64, data: Vec<u8>) {
        self.state.lock().logs.push(LogEntry {
            address: CONTRACT.parse().unwrap(),
            topics: vec![kind.topic()],
            data,
            block_number,
            ..Default::default()
        });
    }

    pub fn fail_kind(&self, kind: EventKind, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.failing_topics.insert(kind.topic());
        } else {
            state.failing_topics.remove(&kind.topic());
        }
    }

    pub fn filter_calls(&self) -> Vec<LogFilter> {
        self.state.lock().filter_calls.clone()
    }

    /// Job addresses of every `completeJob` sent, in order
    pub fn completed_jobs(&self) -> Vec<Address> {
        self.state
            .lock()
            .sent
            .iter()
            .map(|tx| Address::from_slice(&tx.data[4..36]))
            .collect()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn current_height(&self) -> SyncResult<u64> {
        let mut state = self.state.lock();
        if state.height_fails {
            return Err(SyncError::Rpc("height unavailable".into()));
        }
        let height = if state.heights.len() > 1 {
            state.heights.pop_front()
        } else {
            state.heights.front().copied()
        };
        height.ok_or_else(|| SyncError::Rpc("no height scripted".into()))
    }

    async fn filter_logs(&self, filter: &LogFilter) -> SyncResult<Vec<LogEntry>> {
        let mut state = self.state.lock();
        state.filter_calls.push(filter.clone());
        if state.failing_topics.contains(&filter.topic) {
            return Err(SyncError::Rpc("simulated log query failure".into()));
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.topics.first() == Some(&filter.topic)
                    && log.address == filter.address
                    && log.block_number >= filter.from_block
                    && log.block_number <= filter.to_block
            })
            .cloned()
            .collect())
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> SyncResult<TxHash> {
        let mut state = self.state.lock();
        let job = Address::from_slice(&tx.data[4..36]);
        if state.send_fails_for.contains(&job) {
            return Err(SyncError::Transaction("simulated submission failure".into()));
        }
        state.next_tx += 1;
        state.sent.push(tx.clone());
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        Ok(TxHash([state.next_tx; 32]))
    }

    async fn transaction_status(&self, tx_hash: TxHash) -> SyncResult<TxStatus> {
        let mut state = self.state.lock();
        let pending_polls = state.pending_polls;
        let polls = {
            let count = state.polls.entry(tx_hash.0).or_insert(0);
            *count += 1;
            *count
        };
        if state.drop_transactions {
            if polls == 1 {
                state.in_flight -= 1;
            }
            return Ok(TxStatus::Unknown);
        }
        if state.always_pending || polls <= pending_polls {
            return Ok(TxStatus::Pending);
        }
        if polls == pending_polls + 1 {
            state.in_flight -= 1;
        }
        Ok(TxStatus::Mined { block_number: 1000 })
    }
}

pub fn test_config(dir: &TempDir, policy: CheckpointPolicy) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.ethereum.agent_contract_address = CONTRACT.to_string();
    config.ethereum.account_address = ACCOUNT.to_string();
    config.storage.db_path = dir.path().join("db").to_string_lossy().to_string();
    config.sync.poll_interval_ms = 10;
    config.sync.checkpoint_policy = policy;
    config.completion.confirmation_initial_backoff_ms = 1;
    config.completion.confirmation_max_backoff_ms = 4;
    config.completion.confirmation_timeout_secs = 10;
    config
}

pub struct Harness {
    pub ctx: Arc<SyncContext>,
    pub ledger: Arc<MockLedger>,
    pub store: JobStore,
    pub _dir: TempDir,
}

/// Context over a fresh store and scripted ledger, before it is shared
pub fn context_with(
    policy: CheckpointPolicy,
    tweak: impl FnOnce(&mut SyncConfig),
) -> (SyncContext, Arc<MockLedger>, JobStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, policy);
    tweak(&mut config);

    let ledger = Arc::new(MockLedger::default());
    let ledger_dyn: Arc<dyn LedgerClient> = ledger.clone();
    let contract: Arc<dyn JobContract> = Arc::new(AgentContract::new(
        ledger_dyn.clone(),
        config.agent_contract_address().unwrap(),
        config.account_address().unwrap(),
    ));
    let store = JobStore::open(&config.storage).unwrap();

    let ctx = SyncContext::new(config, ledger_dyn, contract, store.clone()).unwrap();
    (ctx, ledger, store, dir)
}

pub fn harness_with(policy: CheckpointPolicy, tweak: impl FnOnce(&mut SyncConfig)) -> Harness {
    let (ctx, ledger, store, dir) = context_with(policy, tweak);
    Harness {
        ctx: Arc::new(ctx),
        ledger,
        store,
        _dir: dir,
    }
}

pub fn harness(policy: CheckpointPolicy) -> Harness {
    harness_with(policy, |_| {})
}

pub fn addr(byte: u8) -> Address {
    Address([byte; 20])
}

/// 65-byte `r || s || v` signature
pub fn signature(seed: u8) -> Vec<u8> {
    let mut sig = vec![seed; 32];
    sig.extend_from_slice(&[seed.wrapping_add(1); 32]);
    sig.push(1);
    sig
}
