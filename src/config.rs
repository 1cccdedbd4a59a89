use std::{str::FromStr, time::Duration};
use thiserror::Error;

use crate::{chain::Chain, dedup};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Settings of the whale monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Destination chat for alerts. Ticks are no-ops without one.
    pub channel_id: Option<String>,
    pub interval: Duration,
    pub cooldown: Duration,
    pub batch_cap: usize,
    pub send_delay: Duration,
    pub provider_timeout: Duration,
    pub fetch_limit: usize,
    pub dedup_capacity: usize,
    pub dedup_evict_batch: usize,
    pub autostart: bool,
    pub min_eth: f64,
    pub min_sol: f64,
    pub min_btc: f64,
    pub min_hyperliquid_usd: f64,
}

impl MonitorConfig {
    pub fn threshold(&self, chain: Chain) -> f64 {
        match chain {
            Chain::Ethereum => self.min_eth,
            Chain::Solana => self.min_sol,
            Chain::Bitcoin => self.min_btc,
            Chain::Hyperliquid => self.min_hyperliquid_usd,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            interval: Duration::from_secs(30),
            cooldown: Duration::from_secs(25),
            batch_cap: 5,
            send_delay: Duration::from_secs(1),
            provider_timeout: Duration::from_secs(15),
            fetch_limit: 20,
            dedup_capacity: dedup::DEFAULT_CAPACITY,
            dedup_evict_batch: dedup::DEFAULT_EVICT_BATCH,
            autostart: true,
            min_eth: 100.0,
            min_sol: 1_000.0,
            min_btc: 10.0,
            min_hyperliquid_usd: 100_000.0,
        }
    }
}

/// Endpoint lists, tried in order.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub ethereum_rpc: Vec<String>,
    pub solana_rpc: Vec<String>,
    pub bitcoin_api: Vec<String>,
    pub hyperliquid_api: Vec<String>,
    pub hyperliquid_coins: Vec<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        let list = |urls: &[&str]| urls.iter().map(|u| u.to_string()).collect();
        Self {
            ethereum_rpc: list(&[
                "https://eth.llamarpc.com",
                "https://rpc.ankr.com/eth",
                "https://cloudflare-eth.com",
            ]),
            solana_rpc: list(&[
                "https://api.mainnet-beta.solana.com",
                "https://solana-rpc.publicnode.com",
            ]),
            bitcoin_api: list(&["https://blockchain.info"]),
            hyperliquid_api: list(&["https://api.hyperliquid.xyz/info"]),
            hyperliquid_coins: list(&["BTC", "ETH", "SOL"]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub monitor: MonitorConfig,
    pub endpoints: EndpointConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let telegram_token = get("TELOXIDE_TOKEN").ok_or(ConfigError::Missing("TELOXIDE_TOKEN"))?;

        let defaults = MonitorConfig::default();
        let secs = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            parse_or(key, get(key), default.as_secs()).map(Duration::from_secs)
        };
        let monitor = MonitorConfig {
            channel_id: get("WHALE_CHANNEL_ID"),
            interval: secs("WHALE_INTERVAL_SECS", defaults.interval)?,
            cooldown: secs("WHALE_COOLDOWN_SECS", defaults.cooldown)?,
            batch_cap: parse_or("WHALE_BATCH_CAP", get("WHALE_BATCH_CAP"), defaults.batch_cap)?,
            send_delay: Duration::from_millis(parse_or(
                "WHALE_SEND_DELAY_MS",
                get("WHALE_SEND_DELAY_MS"),
                defaults.send_delay.as_millis() as u64,
            )?),
            provider_timeout: secs("WHALE_PROVIDER_TIMEOUT_SECS", defaults.provider_timeout)?,
            fetch_limit: parse_or("WHALE_FETCH_LIMIT", get("WHALE_FETCH_LIMIT"), defaults.fetch_limit)?,
            dedup_capacity: parse_or(
                "WHALE_DEDUP_CAPACITY",
                get("WHALE_DEDUP_CAPACITY"),
                defaults.dedup_capacity,
            )?,
            dedup_evict_batch: parse_or(
                "WHALE_DEDUP_EVICT_BATCH",
                get("WHALE_DEDUP_EVICT_BATCH"),
                defaults.dedup_evict_batch,
            )?,
            autostart: parse_or("WHALE_AUTOSTART", get("WHALE_AUTOSTART"), defaults.autostart)?,
            min_eth: parse_or("WHALE_MIN_ETH", get("WHALE_MIN_ETH"), defaults.min_eth)?,
            min_sol: parse_or("WHALE_MIN_SOL", get("WHALE_MIN_SOL"), defaults.min_sol)?,
            min_btc: parse_or("WHALE_MIN_BTC", get("WHALE_MIN_BTC"), defaults.min_btc)?,
            min_hyperliquid_usd: parse_or(
                "WHALE_MIN_HYPERLIQUID_USD",
                get("WHALE_MIN_HYPERLIQUID_USD"),
                defaults.min_hyperliquid_usd,
            )?,
        };
        if monitor.interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "WHALE_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let defaults = EndpointConfig::default();
        let endpoints = EndpointConfig {
            ethereum_rpc: list_or(get("ETH_RPC_URLS"), defaults.ethereum_rpc),
            solana_rpc: list_or(get("SOLANA_RPC_URLS"), defaults.solana_rpc),
            bitcoin_api: list_or(get("BITCOIN_API_URLS"), defaults.bitcoin_api),
            hyperliquid_api: list_or(get("HYPERLIQUID_API_URLS"), defaults.hyperliquid_api),
            hyperliquid_coins: list_or(get("HYPERLIQUID_COINS"), defaults.hyperliquid_coins)
                .into_iter()
                .map(|c| c.to_uppercase())
                .collect(),
        };

        Ok(Self {
            telegram_token,
            monitor,
            endpoints,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn list_or(value: Option<String>, default: Vec<String>) -> Vec<String> {
    let items: Vec<String> = value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if items.is_empty() {
        default
    } else {
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("TELOXIDE_TOKEN", "123:abc")])).unwrap();
        assert_eq!(config.telegram_token, "123:abc");
        assert_eq!(config.monitor.channel_id, None);
        assert_eq!(config.monitor.interval, Duration::from_secs(30));
        assert_eq!(config.monitor.batch_cap, 5);
        assert_eq!(config.monitor.send_delay, Duration::from_secs(1));
        assert_eq!(config.monitor.dedup_capacity, 1000);
        assert!(config.monitor.autostart);
        assert_eq!(config.endpoints.hyperliquid_coins, vec!["BTC", "ETH", "SOL"]);
        assert_eq!(config.monitor.threshold(Chain::Bitcoin), 10.0);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("WHALE_CHANNEL_ID", " -100123 "),
            ("WHALE_INTERVAL_SECS", "60"),
            ("WHALE_SEND_DELAY_MS", "250"),
            ("WHALE_MIN_ETH", "500.5"),
            ("WHALE_AUTOSTART", "false"),
            ("ETH_RPC_URLS", "https://a, ,https://b"),
            ("HYPERLIQUID_COINS", "btc,hype"),
        ]))
        .unwrap();
        assert_eq!(config.monitor.channel_id.as_deref(), Some("-100123"));
        assert_eq!(config.monitor.interval, Duration::from_secs(60));
        assert_eq!(config.monitor.send_delay, Duration::from_millis(250));
        assert_eq!(config.monitor.threshold(Chain::Ethereum), 500.5);
        assert!(!config.monitor.autostart);
        assert_eq!(config.endpoints.ethereum_rpc, vec!["https://a", "https://b"]);
        assert_eq!(config.endpoints.hyperliquid_coins, vec!["BTC", "HYPE"]);
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("TELOXIDE_TOKEN"));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("WHALE_BATCH_CAP", "five"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "WHALE_BATCH_CAP",
                value: "five".to_string()
            }
        );

        let err = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("WHALE_INTERVAL_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WHALE_INTERVAL_SECS", .. }));
    }
}
