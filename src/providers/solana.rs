use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{
    first_success, largest_first, ProviderError, ProviderResult, ScanCursor, WhaleProvider,
};
use crate::{chain::Chain, types::Transaction};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_SLOTS_PER_POLL: u64 = 20;
/// The first poll also reads this many slots below the head, in case the
/// head itself was skipped.
const FIRST_POLL_LOOKBACK: u64 = 2;
const CONCURRENT_BLOCK_REQUESTS: usize = 5;
/// "Slot was skipped" and "slot skipped or missing in long-term storage".
const SKIPPED_SLOT_CODES: [i64; 2] = [-32007, -32009];

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiBlock {
    block_time: Option<i64>,
    #[serde(default)]
    transactions: Vec<UiBlockTransaction>,
}

#[derive(Debug, Deserialize)]
struct UiBlockTransaction {
    meta: Option<UiMeta>,
    transaction: UiAccountsTransaction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiMeta {
    err: Option<Value>,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiAccountsTransaction {
    account_keys: Vec<UiAccountKey>,
    signatures: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UiAccountKey {
    pubkey: String,
}

/// Reads finalized Solana blocks produced since the previous poll and
/// reports large SOL balance movements.
pub struct SolanaProvider {
    client: Client,
    rpc_urls: Vec<String>,
    cursor: ScanCursor,
}

impl SolanaProvider {
    pub fn new(rpc_urls: Vec<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            rpc_urls,
            cursor: ScanCursor::new(MAX_SLOTS_PER_POLL, FIRST_POLL_LOOKBACK),
        }
    }

    async fn envelope<T: DeserializeOwned>(
        &self,
        rpc: &str,
        method: &str,
        params: Value,
    ) -> ProviderResult<RpcResponse<T>> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self.client.post(rpc).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rpc(format!("{method}: HTTP {status}")));
        }
        Ok(response.json().await?)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        rpc: &str,
        method: &str,
        params: Value,
    ) -> ProviderResult<T> {
        let body: RpcResponse<T> = self.envelope(rpc, method, params).await?;
        if let Some(err) = body.error {
            return Err(ProviderError::Rpc(format!(
                "{method}: {} ({})",
                err.message, err.code
            )));
        }
        body.result
            .ok_or_else(|| ProviderError::Decode(format!("{method}: empty result")))
    }

    async fn block(&self, rpc: &str, slot: u64) -> ProviderResult<Option<UiBlock>> {
        let response = self
            .envelope(
                rpc,
                "getBlock",
                json!([
                    slot,
                    {
                        "encoding": "json",
                        "transactionDetails": "accounts",
                        "maxSupportedTransactionVersion": 0,
                        "rewards": false,
                        "commitment": "finalized"
                    }
                ]),
            )
            .await?;
        block_or_skipped(slot, response)
    }

    /// Returns the finalized head and every produced block since the last
    /// scan. Skipped slots contribute nothing.
    async fn new_blocks(&self, rpc: String) -> ProviderResult<(u64, Vec<UiBlock>)> {
        let latest: u64 = self
            .call(&rpc, "getSlot", json!([{ "commitment": "finalized" }]))
            .await?;
        let slots: Vec<u64> = self.cursor.range(latest).collect();
        let mut blocks = Vec::new();
        for chunk in slots.chunks(CONCURRENT_BLOCK_REQUESTS) {
            let requests = chunk.iter().map(|slot| self.block(&rpc, *slot));
            for block in join_all(requests).await {
                blocks.extend(block?);
            }
        }
        Ok((latest, blocks))
    }
}

fn block_or_skipped(slot: u64, response: RpcResponse<UiBlock>) -> ProviderResult<Option<UiBlock>> {
    match response.error {
        Some(err) if SKIPPED_SLOT_CODES.contains(&err.code) => {
            debug!(slot, code = err.code, "solana slot skipped");
            Ok(None)
        }
        Some(err) => Err(ProviderError::Rpc(format!(
            "getBlock {slot}: {} ({})",
            err.message, err.code
        ))),
        None => Ok(response.result),
    }
}

#[async_trait]
impl WhaleProvider for SolanaProvider {
    async fn fetch_large_transactions(
        &self,
        min_value: f64,
        limit: usize,
    ) -> ProviderResult<Vec<Transaction>> {
        let (latest, blocks) =
            first_success(Chain::Solana, &self.rpc_urls, |rpc| self.new_blocks(rpc)).await?;
        self.cursor.advance(latest);
        let now = chrono::Utc::now().timestamp();
        let txs = blocks
            .iter()
            .flat_map(|block| whale_transfers(block, min_value, now))
            .collect();
        Ok(largest_first(txs, limit))
    }
}

/// The sender is the account whose balance dropped the most, the receiver
/// the one whose balance grew the most. Failed transactions are skipped.
fn whale_transfers(block: &UiBlock, min_value: f64, now: i64) -> Vec<Transaction> {
    let timestamp = block.block_time.unwrap_or(now);
    block
        .transactions
        .iter()
        .filter_map(|tx| {
            let meta = tx.meta.as_ref()?;
            if meta.err.is_some() {
                return None;
            }
            let keys = &tx.transaction.account_keys;
            let deltas = meta
                .pre_balances
                .iter()
                .zip(&meta.post_balances)
                .map(|(pre, post)| *post as i128 - *pre as i128);

            let mut sender = None::<(usize, i128)>;
            let mut receiver = None::<(usize, i128)>;
            for (idx, delta) in deltas.enumerate() {
                if delta < 0 && sender.map_or(true, |(_, d)| delta < d) {
                    sender = Some((idx, delta));
                }
                if delta > 0 && receiver.map_or(true, |(_, d)| delta > d) {
                    receiver = Some((idx, delta));
                }
            }

            let (from_idx, sent) = sender?;
            let (to_idx, _) = receiver?;
            let value = (-sent) as f64 / LAMPORTS_PER_SOL;
            if value < min_value {
                return None;
            }
            Some(Transaction::new(
                Chain::Solana,
                tx.transaction.signatures.first()?.clone(),
                keys.get(from_idx)?.pubkey.clone(),
                keys.get(to_idx)?.pubkey.clone(),
                value,
                timestamp,
            ))
        })
        .collect()
}
