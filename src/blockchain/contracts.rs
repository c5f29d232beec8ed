//! # Agent Contract Binding
//!
//! Encodes the agent contract's `completeJob` entry point and submits it
//! through the ledger client.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::client::LedgerClient;
use super::types::{keccak256, TransactionRequest};
use crate::types::{Address, SyncResult, TxHash};

/// Solidity signature of the completion entry point
pub const COMPLETE_JOB_SIGNATURE: &str = "completeJob(address,uint8,bytes32,bytes32)";

/// Contract operation used by the completion worker
#[async_trait]
pub trait JobContract: Send + Sync {
    /// Submit a `completeJob` transaction for `job`
    async fn complete_job(
        &self,
        job: Address,
        v: u8,
        r: [u8; 32],
        s: [u8; 32],
        gas_limit: u64,
    ) -> SyncResult<TxHash>;
}

/// Agent contract instance bound to a ledger client
pub struct AgentContract {
    client: Arc<dyn LedgerClient>,
    contract_address: Address,
    from: Address,
}

impl AgentContract {
    /// Create a new contract binding; `from` is the account sending transactions
    pub fn new(client: Arc<dyn LedgerClient>, contract_address: Address, from: Address) -> Self {
        Self {
            client,
            contract_address,
            from,
        }
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// ABI calldata for `completeJob(job, v, r, s)`
    pub fn encode_complete_job(job: Address, v: u8, r: [u8; 32], s: [u8; 32]) -> Vec<u8> {
        let selector = keccak256(COMPLETE_JOB_SIGNATURE.as_bytes());

        let mut v_word = [0u8; 32];
        v_word[31] = v;

        let mut calldata = Vec::with_capacity(4 + 32 * 4);
        calldata.extend_from_slice(&selector[..4]);
        calldata.extend_from_slice(&job.to_word());
        calldata.extend_from_slice(&v_word);
        calldata.extend_from_slice(&r);
        calldata.extend_from_slice(&s);
        calldata
    }
}

#[async_trait]
impl JobContract for AgentContract {
    async fn complete_job(
        &self,
        job: Address,
        v: u8,
        r: [u8; 32],
        s: [u8; 32],
        gas_limit: u64,
    ) -> SyncResult<TxHash> {
        debug!(job = %job, "encoding completeJob call");

        let tx = TransactionRequest {
            from: self.from,
            to: self.contract_address,
            gas_limit,
            data: Self::encode_complete_job(job, v, r, s),
        };

        let tx_hash = self.client.send_transaction(&tx).await?;
        info!(job = %job, tx = %tx_hash, "completeJob transaction sent");
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_job_calldata_layout() {
        let job = Address([0xAA; 20]);
        let calldata = AgentContract::encode_complete_job(job, 28, [1u8; 32], [2u8; 32]);

        assert_eq!(calldata.len(), 4 + 128);
        assert_eq!(&calldata[..4], &keccak256(COMPLETE_JOB_SIGNATURE.as_bytes())[..4]);
        assert_eq!(&calldata[4..16], &[0u8; 12]);
        assert_eq!(&calldata[16..36], &[0xAA; 20]);
        assert_eq!(calldata[67], 28);
        assert_eq!(&calldata[68..100], &[1u8; 32]);
        assert_eq!(&calldata[100..132], &[2u8; 32]);
    }
}
