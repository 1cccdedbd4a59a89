//! Chain data providers.
//!
//! Every provider answers one question: which transactions above a value
//! threshold happened recently on its chain. Each holds a list of endpoints
//! and falls through them in order until one answers.

pub mod bitcoin;
pub mod ethereum;
pub mod hyperliquid;
pub mod solana;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::BTreeMap, future::Future, ops::RangeInclusive, sync::Arc};
use thiserror::Error;
use tracing::debug;

use crate::{chain::Chain, types::Transaction};

pub use bitcoin::BitcoinProvider;
pub use ethereum::EthereumProvider;
pub use hyperliquid::HyperliquidClient;
pub use solana::SolanaProvider;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("No endpoints configured")]
    NoEndpoints,
    #[error("All {attempts} endpoints failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<ProviderError>,
    },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[async_trait]
pub trait WhaleProvider: Send + Sync {
    /// Recent transactions worth at least `min_value`, largest first, at most
    /// `limit` of them.
    async fn fetch_large_transactions(
        &self,
        min_value: f64,
        limit: usize,
    ) -> ProviderResult<Vec<Transaction>>;
}

/// Providers keyed by chain. Iteration order follows `Chain`'s ordering.
pub type ProviderSet = BTreeMap<Chain, Arc<dyn WhaleProvider>>;

/// Runs `call` against each endpoint in turn and returns the first success.
pub(crate) async fn first_success<T, F, Fut>(
    chain: Chain,
    endpoints: &[String],
    mut call: F,
) -> ProviderResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut last = None;
    for endpoint in endpoints {
        match call(endpoint.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(chain = %chain, endpoint = %endpoint, error = %e, "endpoint failed, trying next");
                last = Some(e);
            }
        }
    }
    match last {
        Some(last) => Err(ProviderError::Exhausted {
            attempts: endpoints.len(),
            last: Box::new(last),
        }),
        None => Err(ProviderError::NoEndpoints),
    }
}

/// Last block height a provider has scanned, so each poll resumes where the
/// previous one ended instead of only looking at the chain head.
pub(crate) struct ScanCursor {
    last: Mutex<Option<u64>>,
    /// Most heights read in one poll.
    window: u64,
    /// Heights before the head included in the very first poll.
    lookback: u64,
}

impl ScanCursor {
    pub fn new(window: u64, lookback: u64) -> Self {
        Self {
            last: Mutex::new(None),
            window: window.max(1),
            lookback,
        }
    }

    /// Heights to read when the head is at `latest`. Empty when nothing new
    /// was produced since the last scan.
    pub fn range(&self, latest: u64) -> RangeInclusive<u64> {
        let oldest = latest.saturating_sub(self.window - 1);
        let start = match *self.last.lock() {
            Some(last) => last.saturating_add(1).max(oldest),
            None => latest.saturating_sub(self.lookback).max(oldest),
        };
        start..=latest
    }

    /// Records a completed scan up to `latest`. Never moves backwards.
    pub fn advance(&self, latest: u64) {
        let mut last = self.last.lock();
        if last.map_or(true, |l| latest > l) {
            *last = Some(latest);
        }
    }
}

/// Sorts by value, largest first, and truncates to `limit`.
pub(crate) fn largest_first(mut txs: Vec<Transaction>, limit: usize) -> Vec<Transaction> {
    txs.sort_by(|a, b| b.value.total_cmp(&a.value));
    txs.truncate(limit);
    txs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn endpoints(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn falls_through_to_next_endpoint() {
        let calls = AtomicUsize::new(0);
        let result = first_success(
            Chain::Solana,
            &endpoints(&["http://down", "http://up"]),
            |endpoint| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if endpoint == "http://up" {
                        Ok(7)
                    } else {
                        Err(ProviderError::Rpc("down".to_string()))
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reports_exhaustion_with_last_error() {
        let result: ProviderResult<()> = first_success(
            Chain::Bitcoin,
            &endpoints(&["a", "b"]),
            |endpoint| async move { Err(ProviderError::Rpc(endpoint)) },
        )
        .await;
        match result {
            Err(ProviderError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(last.to_string().contains('b'));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_endpoint_list_is_an_error() {
        let result: ProviderResult<()> =
            first_success(Chain::Ethereum, &[], |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(ProviderError::NoEndpoints)));
    }

    #[test]
    fn largest_first_sorts_and_truncates() {
        let txs = vec![
            Transaction::new(Chain::Bitcoin, "a", "", "", 1.0, 0),
            Transaction::new(Chain::Bitcoin, "b", "", "", 3.0, 0),
            Transaction::new(Chain::Bitcoin, "c", "", "", 2.0, 0),
        ];
        let sorted = largest_first(txs, 2);
        let hashes: Vec<_> = sorted.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["b", "c"]);
    }

    #[test]
    fn scan_cursor_resumes_after_last_height() {
        let cursor = ScanCursor::new(10, 2);
        assert_eq!(cursor.range(100), 98..=100);
        cursor.advance(100);

        assert!(cursor.range(100).is_empty());
        assert_eq!(cursor.range(103), 101..=103);
        cursor.advance(103);

        // far behind the head: only the newest window is read
        assert_eq!(cursor.range(500), 491..=500);
        cursor.advance(500);
        cursor.advance(400);
        assert_eq!(cursor.range(501), 501..=501);
    }

    #[test]
    fn scan_cursor_first_poll_respects_window() {
        let cursor = ScanCursor::new(1, 5);
        assert_eq!(cursor.range(7), 7..=7);
        let cursor = ScanCursor::new(4, 0);
        assert_eq!(cursor.range(0), 0..=0);
    }
}
