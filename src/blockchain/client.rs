//! # Ledger Client
//!
//! Talks JSON-RPC 2.0 to an Ethereum-compatible node: block height, range log
//! queries, transaction submission and confirmation status.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::types::{LogEntry, LogFilter, TransactionRequest, TxStatus};
use crate::types::{decode_hex, Address, SyncError, SyncResult, TxHash};

/// Ledger operations the sync core depends on
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Latest block height known to the node
    async fn current_height(&self) -> SyncResult<u64>;

    /// Logs matching `filter`, in ledger order
    async fn filter_logs(&self, filter: &LogFilter) -> SyncResult<Vec<LogEntry>>;

    /// Submit a transaction for signing and broadcast
    async fn send_transaction(&self, tx: &TransactionRequest) -> SyncResult<TxHash>;

    /// Confirmation state of a previously submitted transaction
    async fn transaction_status(&self, tx_hash: TxHash) -> SyncResult<TxStatus>;
}

/// JSON-RPC ledger client over HTTP
#[derive(Debug, Clone)]
pub struct JsonRpcLedger {
    rpc_url: Url,
    client: reqwest::Client,
}

impl JsonRpcLedger {
    /// Create a new client for the given RPC endpoint
    pub fn new(rpc_url: &str) -> SyncResult<Self> {
        let rpc_url = Url::parse(rpc_url)
            .map_err(|e| SyncError::Config(format!("invalid RPC URL '{}': {}", rpc_url, e)))?;

        info!("Using ledger RPC endpoint {}", rpc_url);

        Ok(Self {
            rpc_url,
            client: reqwest::Client::new(),
        })
    }

    /// Make an RPC call and return its `result`
    async fn rpc_call(&self, method: &str, params: Value) -> SyncResult<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await?;

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| SyncError::Rpc(format!("Failed to parse {} response: {}", method, e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(SyncError::Rpc(format!("{}: {}", method, error)));
        }

        response_json
            .get("result")
            .cloned()
            .ok_or_else(|| SyncError::Rpc(format!("No result in {} response", method)))
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn current_height(&self) -> SyncResult<u64> {
        let response = self.rpc_call("eth_blockNumber", json!([])).await?;
        parse_quantity(&response)
            .ok_or_else(|| SyncError::Rpc(format!("Invalid block number response: {}", response)))
    }

    async fn filter_logs(&self, filter: &LogFilter) -> SyncResult<Vec<LogEntry>> {
        let params = json!([{
            "fromBlock": format!("{:#x}", filter.from_block),
            "toBlock": format!("{:#x}", filter.to_block),
            "address": filter.address.to_string(),
            "topics": [format!("0x{}", hex::encode(filter.topic))],
        }]);

        let response = self.rpc_call("eth_getLogs", params).await?;

        let logs = response
            .as_array()
            .ok_or_else(|| SyncError::Rpc("eth_getLogs result is not an array".to_string()))?;

        let entries = logs.iter().map(parse_log).collect::<SyncResult<Vec<_>>>()?;
        debug!(
            from = filter.from_block,
            to = filter.to_block,
            count = entries.len(),
            "fetched logs"
        );
        Ok(entries)
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> SyncResult<TxHash> {
        let params = json!([{
            "from": tx.from.to_string(),
            "to": tx.to.to_string(),
            "gas": format!("{:#x}", tx.gas_limit),
            "data": format!("0x{}", hex::encode(&tx.data)),
        }]);

        let response = self.rpc_call("eth_sendTransaction", params).await?;
        let hash = response
            .as_str()
            .ok_or_else(|| SyncError::Transaction(format!("unexpected tx hash response: {}", response)))?;
        hash.parse()
    }

    async fn transaction_status(&self, tx_hash: TxHash) -> SyncResult<TxStatus> {
        let response = self
            .rpc_call("eth_getTransactionByHash", json!([tx_hash.to_string()]))
            .await?;

        if response.is_null() {
            return Ok(TxStatus::Unknown);
        }

        Ok(match parse_quantity(&response["blockNumber"]) {
            Some(block_number) => TxStatus::Mined { block_number },
            None => TxStatus::Pending,
        })
    }
}

/// Parse a JSON-RPC quantity given either as a number or a hex string
pub fn parse_quantity(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_str()
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
    })
}

/// Parse one `eth_getLogs` entry
fn parse_log(value: &Value) -> SyncResult<LogEntry> {
    let address = value["address"]
        .as_str()
        .map(str::parse::<Address>)
        .transpose()?
        .unwrap_or_default();

    let topics = value["topics"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| {
                    let bytes = decode_hex(s)?;
                    <[u8; 32]>::try_from(bytes.as_slice())
                        .map_err(|_| SyncError::Decode(format!("topic must be 32 bytes: {}", s)))
                })
                .collect::<SyncResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let data = match value["data"].as_str() {
        Some(s) => decode_hex(s)?,
        None => Vec::new(),
    };

    let transaction_hash = value["transactionHash"]
        .as_str()
        .map(str::parse::<TxHash>)
        .transpose()?;

    Ok(LogEntry {
        address,
        topics,
        data,
        block_number: parse_quantity(&value["blockNumber"]).unwrap_or(0),
        transaction_hash,
        log_index: parse_quantity(&value["logIndex"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(JsonRpcLedger::new("http://127.0.0.1:8545").is_ok());
        assert!(matches!(JsonRpcLedger::new("invalid-url"), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x64")), Some(100));
        assert_eq!(parse_quantity(&json!(7)), Some(7));
        assert_eq!(parse_quantity(&Value::Null), None);
    }

    #[test]
    fn test_parse_log() {
        let log = json!({
            "address": "0x00000000000000000000000000000000000000aa",
            "topics": [format!("0x{}", "11".repeat(32))],
            "data": format!("0x{}", "22".repeat(64)),
            "blockNumber": "0x34",
            "transactionHash": format!("0x{}", "33".repeat(32)),
            "logIndex": "0x1"
        });

        let entry = parse_log(&log).unwrap();
        assert_eq!(entry.address.0[19], 0xAA);
        assert_eq!(entry.topics, vec![[0x11; 32]]);
        assert_eq!(entry.data.len(), 64);
        assert_eq!(entry.block_number, 52);
        assert_eq!(entry.log_index, Some(1));
        assert!(entry.transaction_hash.is_some());
    }

    #[test]
    fn test_parse_log_rejects_bad_data() {
        let log = json!({ "data": "0xnothex" });
        assert!(matches!(parse_log(&log), Err(SyncError::Decode(_))));
    }
}
