use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{first_success, largest_first, ProviderError, ProviderResult, WhaleProvider};
use crate::{chain::Chain, types::Transaction};

const SATS_PER_BTC: f64 = 100_000_000.0;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct UnconfirmedResponse {
    #[serde(default)]
    txs: Vec<RawTx>,
}

#[derive(Debug, Deserialize)]
struct RawTx {
    hash: String,
    time: Option<i64>,
    #[serde(default)]
    inputs: Vec<RawInput>,
    #[serde(default)]
    out: Vec<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    prev_out: Option<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    addr: Option<String>,
    #[serde(default)]
    value: u64,
}

/// Watches the blockchain.info unconfirmed transaction feed.
pub struct BitcoinProvider {
    client: Client,
    api_urls: Vec<String>,
}

impl BitcoinProvider {
    pub fn new(api_urls: Vec<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, api_urls }
    }

    async fn unconfirmed(&self, base: String) -> ProviderResult<UnconfirmedResponse> {
        let url = format!(
            "{}/unconfirmed-transactions?format=json",
            base.trim_end_matches('/')
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rpc(format!("HTTP {status} from {url}")));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl WhaleProvider for BitcoinProvider {
    async fn fetch_large_transactions(
        &self,
        min_value: f64,
        limit: usize,
    ) -> ProviderResult<Vec<Transaction>> {
        let feed = first_success(Chain::Bitcoin, &self.api_urls, |base| self.unconfirmed(base)).await?;
        let now = chrono::Utc::now().timestamp();
        Ok(largest_first(whale_transfers(&feed, min_value, now), limit))
    }
}

/// Value is the sum of all outputs. The first input address is the sender,
/// the largest output the receiver.
fn whale_transfers(feed: &UnconfirmedResponse, min_value: f64, now: i64) -> Vec<Transaction> {
    feed.txs
        .iter()
        .filter_map(|tx| {
            let total = tx
                .out
                .iter()
                .fold(0u64, |acc, o| acc.saturating_add(o.value));
            let value = total as f64 / SATS_PER_BTC;
            if value < min_value {
                return None;
            }
            let from = tx
                .inputs
                .iter()
                .filter_map(|i| i.prev_out.as_ref()?.addr.clone())
                .next()
                .unwrap_or_else(|| "coinbase".to_string());
            let to = tx
                .out
                .iter()
                .max_by_key(|o| o.value)
                .and_then(|o| o.addr.clone())
                .unwrap_or_else(|| "unknown".to_string());
            Some(Transaction::new(
                Chain::Bitcoin,
                tx.hash.clone(),
                from,
                to,
                value,
                tx.time.unwrap_or(now),
            ))
        })
        .collect()
}
