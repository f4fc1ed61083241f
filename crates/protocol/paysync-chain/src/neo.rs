//! Neo N3 JSON-RPC chain source.
//!
//! Scans confirmed blocks in height order and reads each transaction's
//! application log, emitting one [`ChainEvent`] per transaction whose
//! successful (`HALT`) execution raised the payment contract's receipt
//! notification. The notification state is
//! `[from: Hash160, amount: Integer, data: ByteString?]`, where `data`
//! carries the payment nonce.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use paysync_crypto::ScriptHash;
use paysync_types::{Address, Amount, CursorPosition, Nonce, StreamId, TxDigest};

use crate::config::NeoRpcConfig;
use crate::error::{ChainError, ChainResult};
use crate::retry::RetryPolicy;
use crate::traits::ChainSource;
use crate::types::{ChainEvent, EventBatch};

// =============================================================================
// RPC payloads
// =============================================================================

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    #[serde(default)]
    tx: Vec<RpcBlockTx>,
}

#[derive(Debug, Deserialize)]
struct RpcBlockTx {
    hash: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApplicationLog {
    #[serde(default)]
    executions: Vec<Execution>,
}

#[derive(Debug, Deserialize)]
struct Execution {
    vmstate: String,
    #[serde(default)]
    notifications: Vec<Notification>,
}

#[derive(Debug, Deserialize)]
struct Notification {
    contract: String,
    eventname: String,
    state: StackItem,
}

#[derive(Debug, Deserialize)]
struct StackItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl StackItem {
    fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    fn bytes(&self) -> ChainResult<Vec<u8>> {
        let raw = self.as_str().unwrap_or_default();
        BASE64
            .decode(raw)
            .map_err(|e| ChainError::invalid_response(format!("bad base64 in {}: {}", self.kind, e)))
    }
}

// =============================================================================
// Notification decoding
// =============================================================================

/// Decoded payment notification state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PaymentNotification {
    pub from: Address,
    pub amount: Amount,
    pub nonce: Option<Nonce>,
}

fn decode_sender(item: &StackItem) -> ChainResult<Address> {
    let hash = match item.kind.as_str() {
        "Hash160" => {
            let s = item.as_str().unwrap_or_default();
            ScriptHash::from_hex(s)
        }
        "ByteString" | "Buffer" => ScriptHash::from_le_slice(&item.bytes()?),
        other => {
            return Err(ChainError::invalid_response(format!(
                "sender has type {}",
                other
            )))
        }
    }
    .map_err(|e| ChainError::invalid_response(format!("bad sender: {}", e)))?;
    Ok(Address::from_script_hash(&hash))
}

fn decode_amount(item: &StackItem) -> ChainResult<Amount> {
    if item.kind != "Integer" {
        return Err(ChainError::invalid_response(format!(
            "amount has type {}",
            item.kind
        )));
    }
    let text = match &item.value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(ChainError::invalid_response(format!(
                "amount value {}",
                other
            )))
        }
    };
    text.parse::<Amount>()
        .map_err(|e| ChainError::invalid_response(format!("amount '{}': {}", text, e)))
}

fn decode_nonce(item: Option<&StackItem>) -> ChainResult<Option<Nonce>> {
    let Some(item) = item else {
        return Ok(None);
    };
    match item.kind.as_str() {
        "ByteString" | "Buffer" => {
            let bytes = item.bytes()?;
            if bytes.is_empty() {
                return Ok(None);
            }
            // Undecodable data still counts as a nonce, so it can never
            // match a stored one.
            let nonce = std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| Nonce::parse(s).ok())
                .unwrap_or_else(|| Nonce::new_unchecked(hex::encode(&bytes)));
            Ok(Some(nonce))
        }
        "Integer" => Ok(item.as_str().map(Nonce::new_unchecked)),
        _ => Ok(None),
    }
}

pub(crate) fn decode_payment_state(state: &StackItem) -> ChainResult<PaymentNotification> {
    if state.kind != "Array" {
        return Err(ChainError::invalid_response(format!(
            "notification state has type {}",
            state.kind
        )));
    }
    let items: Vec<StackItem> = serde_json::from_value(state.value.clone())
        .map_err(|e| ChainError::invalid_response(format!("notification state: {}", e)))?;
    if items.len() < 2 {
        return Err(ChainError::invalid_response(format!(
            "notification state has {} items",
            items.len()
        )));
    }

    Ok(PaymentNotification {
        from: decode_sender(&items[0])?,
        amount: decode_amount(&items[1])?,
        nonce: decode_nonce(items.get(2))?,
    })
}

/// Find the payment notification in a transaction's application log.
pub(crate) fn extract_payment(
    log: &ApplicationLog,
    contract: &str,
    event_name: &str,
    tx_hash: &str,
    position: CursorPosition,
) -> ChainResult<Option<ChainEvent>> {
    let notification = log
        .executions
        .iter()
        .filter(|exec| exec.vmstate == "HALT")
        .flat_map(|exec| exec.notifications.iter())
        .find(|n| n.contract.eq_ignore_ascii_case(contract) && n.eventname == event_name);

    let Some(notification) = notification else {
        return Ok(None);
    };

    let decoded = match decode_payment_state(&notification.state) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(tx = tx_hash, error = %e, "Skipping malformed payment notification");
            return Ok(None);
        }
    };
    let tx_digest = TxDigest::parse(tx_hash)
        .map_err(|e| ChainError::invalid_response(format!("transaction hash: {}", e)))?;

    Ok(Some(ChainEvent {
        position,
        tx_digest,
        address: decoded.from,
        amount: decoded.amount,
        nonce: decoded.nonce,
    }))
}

// =============================================================================
// Source
// =============================================================================

/// [`ChainSource`] backed by a Neo N3 node.
pub struct NeoRpcSource {
    client: reqwest::Client,
    config: NeoRpcConfig,
    /// Payment contract in lowercase `0x` display form
    contract: String,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl NeoRpcSource {
    /// Create a source, validating the configuration.
    pub fn new(config: NeoRpcConfig, retry: RetryPolicy) -> ChainResult<Self> {
        config.validate()?;
        let contract = config.parse_contract()?.to_hex();
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChainError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            contract,
            retry,
            next_id: AtomicU64::new(1),
        })
    }

    /// The configuration this source was built with.
    pub fn config(&self) -> &NeoRpcConfig {
        &self.config
    }

    async fn call<T>(&self, method: &'static str, params: serde_json::Value) -> ChainResult<T>
    where
        T: DeserializeOwned + Send,
    {
        self.retry
            .execute(|| self.call_once(method, params.clone()))
            .await
    }

    async fn call_once<T>(&self, method: &'static str, params: serde_json::Value) -> ChainResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let msg = format!("{} returned HTTP {}: {}", method, status, text);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ChainError::network(msg)
            } else {
                ChainError::invalid_response(msg)
            });
        }

        let envelope: RpcEnvelope<T> = response.json().await?;
        if let Some(err) = envelope.error {
            return Err(ChainError::rpc(err.code, err.message));
        }
        envelope.result.ok_or_else(|| {
            ChainError::invalid_response(format!("{} returned neither result nor error", method))
        })
    }

    async fn block_count(&self) -> ChainResult<u64> {
        self.call("getblockcount", json!([])).await
    }

    /// Highest height with enough confirmations, if any.
    fn confirmed_tip(&self, block_count: u64) -> Option<u64> {
        block_count.checked_sub(self.config.confirmations.max(1))
    }

    async fn block_tx_hashes(&self, height: u64) -> ChainResult<Vec<String>> {
        let block: RpcBlock = self.call("getblock", json!([height, true])).await?;
        Ok(block.tx.into_iter().map(|tx| tx.hash).collect())
    }

    async fn payment_in_tx(
        &self,
        tx_hash: &str,
        position: CursorPosition,
    ) -> ChainResult<Option<ChainEvent>> {
        let log: ApplicationLog = self.call("getapplicationlog", json!([tx_hash])).await?;
        extract_payment(
            &log,
            &self.contract,
            &self.config.event_name,
            tx_hash,
            position,
        )
    }
}

#[async_trait]
impl ChainSource for NeoRpcSource {
    async fn fetch_events(
        &self,
        stream: &StreamId,
        after: Option<CursorPosition>,
        limit: u32,
    ) -> ChainResult<EventBatch> {
        let start = match after {
            None => self.config.start_height,
            Some(pos) if pos.is_end_of_block() => pos.height + 1,
            Some(pos) => pos.height,
        }
        .max(self.config.start_height);

        let Some(tip) = self.confirmed_tip(self.block_count().await?) else {
            return Ok(EventBatch::empty());
        };
        if start > tip {
            return Ok(EventBatch::empty());
        }
        let end = tip.min(start.saturating_add(self.config.max_blocks_per_batch - 1));
        debug!(stream = %stream, start, end, tip, "Scanning blocks");

        let limit = limit.max(1) as usize;
        let mut batch = EventBatch::empty();

        for height in start..=end {
            let hashes = self.block_tx_hashes(height).await?;
            for (index, hash) in hashes.iter().enumerate() {
                let position = CursorPosition::new(height, index as u32);
                if after.is_some_and(|a| position <= a) {
                    continue;
                }

                if let Some(event) = self.payment_in_tx(hash, position).await? {
                    batch.events.push(event);
                    if batch.events.len() >= limit {
                        batch.checkpoint = Some(position);
                        return Ok(batch);
                    }
                }
            }
            batch.checkpoint = Some(CursorPosition::end_of_block(height));
        }

        Ok(batch)
    }

    async fn get_event_by_digest(&self, digest: &TxDigest) -> ChainResult<Option<ChainEvent>> {
        let height: u64 = match self
            .call("gettransactionheight", json!([digest.as_str()]))
            .await
        {
            Ok(height) => height,
            // Unknown or still in the mempool
            Err(ChainError::Rpc { code, message }) => {
                debug!(tx = %digest, rpc_code = code, rpc_message = %message, "Transaction not found on chain");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.confirmed_tip(self.block_count().await?) {
            Some(tip) if height <= tip => {}
            _ => return Ok(None),
        }

        let hashes = self.block_tx_hashes(height).await?;
        let index = hashes
            .iter()
            .position(|h| h.eq_ignore_ascii_case(digest.as_str()))
            .ok_or_else(|| {
                ChainError::invalid_response(format!(
                    "transaction {} missing from block {}",
                    digest, height
                ))
            })?;

        self.payment_in_tx(&hashes[index], CursorPosition::new(height, index as u32))
            .await
    }

    async fn chain_height(&self) -> ChainResult<u64> {
        Ok(self.block_count().await?.saturating_sub(1))
    }
}
