use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{Block, BlockNumber, Transaction as EthTransaction},
    utils::format_ether,
};
use futures::future::join_all;

use super::{
    first_success, largest_first, ProviderError, ProviderResult, ScanCursor, WhaleProvider,
};
use crate::{chain::Chain, types::Transaction};

/// Blocks read per poll. Roughly three are produced per 30 s tick.
const MAX_BLOCKS_PER_POLL: u64 = 6;

/// Scans new Ethereum blocks for large native ETH transfers.
pub struct EthereumProvider {
    rpc_urls: Vec<String>,
    cursor: ScanCursor,
}

fn rpc_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Rpc(e.to_string())
}

impl EthereumProvider {
    pub fn new(rpc_urls: Vec<String>) -> Self {
        Self {
            rpc_urls,
            cursor: ScanCursor::new(MAX_BLOCKS_PER_POLL, 0),
        }
    }

    /// Returns the head height and every block after the last scan.
    async fn new_blocks(&self, rpc: String) -> ProviderResult<(u64, Vec<Block<EthTransaction>>)> {
        let provider = Provider::<Http>::try_from(rpc.as_str())
            .map_err(|e| ProviderError::Rpc(format!("invalid rpc url {rpc}: {e}")))?;
        let latest = provider.get_block_number().await.map_err(rpc_error)?.as_u64();

        let requests = self
            .cursor
            .range(latest)
            .map(|number| provider.get_block_with_txs(BlockNumber::Number(number.into())));
        let mut blocks = Vec::new();
        for block in join_all(requests).await {
            blocks.extend(block.map_err(rpc_error)?);
        }
        Ok((latest, blocks))
    }
}

#[async_trait]
impl WhaleProvider for EthereumProvider {
    async fn fetch_large_transactions(
        &self,
        min_value: f64,
        limit: usize,
    ) -> ProviderResult<Vec<Transaction>> {
        let (latest, blocks) =
            first_success(Chain::Ethereum, &self.rpc_urls, |rpc| self.new_blocks(rpc)).await?;
        self.cursor.advance(latest);
        let txs = blocks
            .iter()
            .flat_map(|block| whale_transfers(block, min_value))
            .collect();
        Ok(largest_first(txs, limit))
    }
}

fn wei_to_eth(wei: ethers::types::U256) -> f64 {
    format_ether(wei).parse().unwrap_or(0.0)
}

/// Transfers in `block` carrying at least `min_value` ETH.
fn whale_transfers(block: &Block<EthTransaction>, min_value: f64) -> Vec<Transaction> {
    let timestamp = block.timestamp.low_u64() as i64;
    block
        .transactions
        .iter()
        .filter_map(|tx| {
            let value = wei_to_eth(tx.value);
            if value < min_value {
                return None;
            }
            let to = tx
                .to
                .map(|to| format!("{to:#x}"))
                .unwrap_or_else(|| "contract creation".to_string());
            Some(Transaction::new(
                Chain::Ethereum,
                format!("{:#x}", tx.hash),
                format!("{:#x}", tx.from),
                to,
                value,
                timestamp,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, H256, U256};

    fn eth_tx(hash: u8, value_wei: &str, to: Option<Address>) -> EthTransaction {
        EthTransaction {
            hash: H256::repeat_byte(hash),
            from: Address::repeat_byte(0xaa),
            to,
            value: U256::from_dec_str(value_wei).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_whale_transfers_filters_by_value() {
        let block = Block {
            timestamp: U256::from(1_700_000_000u64),
            transactions: vec![
                // 150 ether
                eth_tx(1, "150000000000000000000", Some(Address::repeat_byte(0xbb))),
                // 0.5 ether
                eth_tx(2, "500000000000000000", Some(Address::repeat_byte(0xbb))),
                // 100 ether, contract creation
                eth_tx(3, "100000000000000000000", None),
            ],
            ..Default::default()
        };

        let txs = whale_transfers(&block, 100.0);
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].value, 150.0);
        assert_eq!(txs[0].timestamp, 1_700_000_000);
        assert_eq!(txs[0].from, format!("{:#x}", Address::repeat_byte(0xaa)));
        assert!(txs[0].hash.starts_with("0x0101"));
        assert_eq!(txs[1].to, "contract creation");
    }

    #[test]
    fn test_wei_to_eth() {
        let wei = U256::from_dec_str("131550000000000000000").unwrap();
        assert!((wei_to_eth(wei) - 131.55).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_endpoints_is_an_error() {
        let provider = EthereumProvider::new(vec![]);
        let result = provider.fetch_large_transactions(1.0, 5).await;
        assert!(matches!(result, Err(ProviderError::NoEndpoints)));
    }
}
