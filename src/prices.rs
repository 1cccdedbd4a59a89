//! Spot prices from public aggregators. CoinGecko first, Binance as backup.

use reqwest::Client;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

use crate::format::format_amount;

const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
const BINANCE_URL: &str = "https://api.binance.com/api/v3/ticker/24hr";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no price found for {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price_usd: f64,
    pub change_24h_pct: Option<f64>,
    pub source: &'static str,
}

impl Quote {
    pub fn format(&self) -> String {
        let change = match self.change_24h_pct {
            Some(pct) if pct >= 0.0 => format!("📈 +{pct:.2}%"),
            Some(pct) => format!("📉 {pct:.2}%"),
            None => "n/a".to_string(),
        };
        format!(
            "<b>{}</b>: ${}\n24h: {}\n<i>source: {}</i>",
            self.symbol,
            format_price(self.price_usd),
            change,
            self.source
        )
    }
}

/// Precision grows as the price shrinks.
pub fn format_price(price: f64) -> String {
    let abs = price.abs();
    if abs >= 1000.0 {
        format_amount(price)
    } else if abs >= 1.0 {
        format!("{price:.4}")
    } else if abs >= 0.0001 {
        format!("{price:.6}")
    } else {
        format!("{price:.10}")
    }
}

/// Maps common tickers to CoinGecko ids.
pub fn coingecko_id(symbol: &str) -> Option<&'static str> {
    let id = match symbol.to_uppercase().as_str() {
        "BTC" => "bitcoin",
        "ETH" => "ethereum",
        "SOL" => "solana",
        "HYPE" => "hyperliquid",
        "BNB" => "binancecoin",
        "XRP" => "ripple",
        "DOGE" => "dogecoin",
        "ADA" => "cardano",
        "AVAX" => "avalanche-2",
        "LINK" => "chainlink",
        "USDT" => "tether",
        "USDC" => "usd-coin",
        _ => return None,
    };
    Some(id)
}

#[derive(Debug, Deserialize)]
struct CoinGeckoEntry {
    usd: f64,
    usd_24h_change: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker {
    last_price: String,
    price_change_percent: String,
}

pub struct PriceClient {
    client: Client,
}

impl PriceClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    pub async fn quote(&self, symbol: &str) -> Result<Quote, PriceError> {
        let symbol = symbol.trim().to_uppercase();
        if let Some(id) = coingecko_id(&symbol) {
            match self.coingecko(&symbol, id).await {
                Ok(quote) => return Ok(quote),
                Err(e) => warn!(symbol = %symbol, error = %e, "coingecko lookup failed"),
            }
        }
        debug!(symbol = %symbol, "falling back to binance");
        self.binance(&symbol).await
    }

    async fn coingecko(&self, symbol: &str, id: &str) -> Result<Quote, PriceError> {
        let body: HashMap<String, CoinGeckoEntry> = self
            .client
            .get(COINGECKO_URL)
            .query(&[
                ("ids", id),
                ("vs_currencies", "usd"),
                ("include_24hr_change", "true"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_coingecko(symbol, id, body)
    }

    async fn binance(&self, symbol: &str) -> Result<Quote, PriceError> {
        let pair = format!("{symbol}USDT");
        let response = self
            .client
            .get(BINANCE_URL)
            .query(&[("symbol", pair.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PriceError::NotFound(symbol.to_string()));
        }
        let ticker: BinanceTicker = response.json().await?;
        parse_binance(symbol, ticker)
    }
}

impl Default for PriceClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_coingecko(
    symbol: &str,
    id: &str,
    mut body: HashMap<String, CoinGeckoEntry>,
) -> Result<Quote, PriceError> {
    let entry = body
        .remove(id)
        .ok_or_else(|| PriceError::NotFound(symbol.to_string()))?;
    Ok(Quote {
        symbol: symbol.to_string(),
        price_usd: entry.usd,
        change_24h_pct: entry.usd_24h_change,
        source: "CoinGecko",
    })
}

fn parse_binance(symbol: &str, ticker: BinanceTicker) -> Result<Quote, PriceError> {
    let price_usd = ticker
        .last_price
        .parse()
        .map_err(|_| PriceError::NotFound(symbol.to_string()))?;
    Ok(Quote {
        symbol: symbol.to_string(),
        price_usd,
        change_24h_pct: ticker.price_change_percent.parse().ok(),
        source: "Binance",
    })
}
