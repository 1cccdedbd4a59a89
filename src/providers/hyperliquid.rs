//! Hyperliquid info API client.
//!
//! Serves two purposes: large recent trades for the whale monitor, and L2
//! order book snapshots for the `/book` command.

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::{first_success, largest_first, ProviderError, ProviderResult, WhaleProvider};
use crate::{chain::Chain, types::Transaction};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body for the info endpoint.
#[derive(Debug, Serialize)]
struct InfoRequest<'a> {
    #[serde(rename = "type")]
    request_type: &'static str,
    coin: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTrade {
    coin: String,
    side: String,
    px: String,
    sz: String,
    /// Milliseconds since epoch.
    time: i64,
    hash: String,
    tid: u64,
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    #[serde(deserialize_with = "de_str_f64")]
    pub px: f64,
    #[serde(deserialize_with = "de_str_f64")]
    pub sz: f64,
    pub n: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct L2Book {
    pub coin: String,
    pub time: i64,
    /// `[bids, asks]`, best level first.
    pub levels: (Vec<BookLevel>, Vec<BookLevel>),
}

impl L2Book {
    pub fn bids(&self) -> &[BookLevel] {
        &self.levels.0
    }

    pub fn asks(&self) -> &[BookLevel] {
        &self.levels.1
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.asks().first()?.px - self.bids().first()?.px)
    }
}

fn de_str_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

pub struct HyperliquidClient {
    client: Client,
    info_urls: Vec<String>,
    coins: Vec<String>,
}

impl HyperliquidClient {
    pub fn new(info_urls: Vec<String>, coins: Vec<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            info_urls,
            coins,
        }
    }

    async fn info<T: DeserializeOwned>(&self, request_type: &'static str, coin: &str) -> ProviderResult<T> {
        first_success(Chain::Hyperliquid, &self.info_urls, |url| async move {
            let response = self
                .client
                .post(&url)
                .json(&InfoRequest { request_type, coin })
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Rpc(format!("HTTP {status}: {body}")));
            }
            Ok(response.json::<T>().await?)
        })
        .await
    }

    pub async fn l2_book(&self, coin: &str) -> ProviderResult<L2Book> {
        self.info("l2Book", &coin.to_uppercase()).await
    }

    async fn recent_trades(&self, coin: &str) -> ProviderResult<Vec<RawTrade>> {
        self.info("recentTrades", coin).await
    }
}

#[async_trait]
impl WhaleProvider for HyperliquidClient {
    async fn fetch_large_transactions(
        &self,
        min_value: f64,
        limit: usize,
    ) -> ProviderResult<Vec<Transaction>> {
        let mut trades = Vec::new();
        let mut last_error = None;
        for coin in &self.coins {
            match self.recent_trades(coin).await {
                Ok(batch) => trades.extend(batch),
                Err(e) => {
                    warn!(coin = %coin, error = %e, "hyperliquid trades unavailable");
                    last_error = Some(e);
                }
            }
        }
        if trades.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(largest_first(whale_trades(&trades, min_value), limit))
    }
}

fn is_zero_hash(hash: &str) -> bool {
    hash.trim_start_matches("0x").chars().all(|c| c == '0')
}

/// Trades whose notional (`px * sz`) is at least `min_value` USD.
fn whale_trades(trades: &[RawTrade], min_value: f64) -> Vec<Transaction> {
    trades
        .iter()
        .filter_map(|trade| {
            let price: f64 = trade.px.parse().ok()?;
            let size: f64 = trade.sz.parse().ok()?;
            let notional = price * size;
            if notional < min_value {
                return None;
            }
            // several fills can share a zero hash; fall back to the trade id
            let hash = if is_zero_hash(&trade.hash) {
                format!("tid-{}", trade.tid)
            } else {
                trade.hash.clone()
            };
            // users is [buyer, seller]; the asset always moves seller -> buyer
            let buyer = trade.users.first().cloned().unwrap_or_default();
            let seller = trade.users.get(1).cloned().unwrap_or_default();
            let mut tx = Transaction::new(
                Chain::Hyperliquid,
                hash,
                seller,
                buyer,
                notional,
                trade.time / 1000,
            );
            tx.size = Some(size);
            tx.price = Some(price);
            tx.side = Some(trade.side.clone());
            tx.symbol = Some(trade.coin.clone());
            Some(tx)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trades() -> Vec<RawTrade> {
        serde_json::from_value(json!([
            {
                "coin": "BTC", "side": "B", "px": "100000.0", "sz": "2.5",
                "time": 1700000000123u64, "hash": "0xabc", "tid": 1,
                "users": ["0xbuyer", "0xseller"]
            },
            {
                "coin": "BTC", "side": "A", "px": "100000.0", "sz": "0.01",
                "time": 1700000001000u64, "hash": "0xdef", "tid": 2,
                "users": ["0xbuyer", "0xseller"]
            },
            {
                "coin": "ETH", "side": "A", "px": "4000", "sz": "50",
                "time": 1700000002000u64,
                "hash": "0x0000000000000000000000000000000000000000000000000000000000000000",
                "tid": 77, "users": ["0xmaker", "0xtaker"]
            },
            {
                "coin": "SOL", "side": "A", "px": "200", "sz": "1000",
                "time": 1700000003000u64, "hash": "0x5e11", "tid": 78,
                "users": ["0xbuyer", "0xseller"]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_whale_trades() {
        let txs = whale_trades(&trades(), 100_000.0);
        assert_eq!(txs.len(), 3);

        assert_eq!(txs[0].hash, "0xabc");
        assert_eq!(txs[0].value, 250_000.0);
        assert_eq!(txs[0].timestamp, 1_700_000_000);
        assert_eq!(txs[0].from, "0xseller");
        assert_eq!(txs[0].to, "0xbuyer");
        assert_eq!(txs[0].symbol.as_deref(), Some("BTC"));

        assert_eq!(txs[1].hash, "tid-77");
        assert_eq!(txs[1].value, 200_000.0);
        assert_eq!(txs[1].from, "0xtaker");
        assert_eq!(txs[1].to, "0xmaker");
    }

    #[test]
    fn sell_side_still_flows_seller_to_buyer() {
        let txs = whale_trades(&trades(), 100_000.0);
        let sell = txs.iter().find(|tx| tx.hash == "0x5e11").unwrap();
        assert_eq!(sell.side.as_deref(), Some("A"));
        assert_eq!(sell.from, "0xseller");
        assert_eq!(sell.to, "0xbuyer");
        assert_eq!(sell.value, 200_000.0);
    }

    #[test]
    fn test_l2_book_decode() {
        let book: L2Book = serde_json::from_value(json!({
            "coin": "BTC",
            "time": 1700000000000u64,
            "levels": [
                [{ "px": "99990.0", "sz": "1.5", "n": 3 }],
                [{ "px": "100010.0", "sz": "0.7", "n": 1 }]
            ]
        }))
        .unwrap();
        assert_eq!(book.bids()[0].px, 99_990.0);
        assert_eq!(book.asks()[0].sz, 0.7);
        assert_eq!(book.spread(), Some(20.0));
    }

    #[test]
    fn info_request_serializes_type_field() {
        let body = serde_json::to_value(InfoRequest {
            request_type: "recentTrades",
            coin: "SOL",
        })
        .unwrap();
        assert_eq!(body, json!({ "type": "recentTrades", "coin": "SOL" }));
    }
}
