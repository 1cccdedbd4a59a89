use lazy_static::lazy_static;
use std::{collections::HashMap, fmt, str::FromStr};

/// Chains the bot knows how to watch. Declaration order is the order
/// provider results are merged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {
    Ethereum,
    Solana,
    Bitcoin,
    Hyperliquid,
}

lazy_static! {
    pub static ref CHAINS_INFO: HashMap<Chain, ChainInfo> = {
        let mut m = HashMap::new();
        m.insert(
            Chain::Ethereum,
            ChainInfo {
                name: "Ethereum",
                unit: "ETH",
                emoji: "🔷",
                tx_url: "https://etherscan.io/tx/",
                address_url: "https://etherscan.io/address/",
            },
        );
        m.insert(
            Chain::Solana,
            ChainInfo {
                name: "Solana",
                unit: "SOL",
                emoji: "🟣",
                tx_url: "https://solscan.io/tx/",
                address_url: "https://solscan.io/account/",
            },
        );
        m.insert(
            Chain::Bitcoin,
            ChainInfo {
                name: "Bitcoin",
                unit: "BTC",
                emoji: "🟠",
                tx_url: "https://www.blockchain.com/explorer/transactions/btc/",
                address_url: "https://www.blockchain.com/explorer/addresses/btc/",
            },
        );
        m.insert(
            Chain::Hyperliquid,
            ChainInfo {
                name: "Hyperliquid",
                unit: "USD",
                emoji: "🟢",
                tx_url: "https://app.hyperliquid.xyz/explorer/tx/",
                address_url: "https://app.hyperliquid.xyz/explorer/address/",
            },
        );
        m
    };
}

pub struct ChainInfo {
    pub name: &'static str,
    /// Display unit of `Transaction::value` on this chain.
    pub unit: &'static str,
    pub emoji: &'static str,
    pub tx_url: &'static str,
    pub address_url: &'static str,
}

impl Chain {
    pub const ALL: [Chain; 4] = [
        Chain::Ethereum,
        Chain::Solana,
        Chain::Bitcoin,
        Chain::Hyperliquid,
    ];

    pub fn info(&self) -> &'static ChainInfo {
        // every variant is registered above
        &CHAINS_INFO[self]
    }

    pub fn tx_link(&self, hash: &str) -> String {
        format!("{}{}", self.info().tx_url, hash)
    }

    pub fn address_link(&self, address: &str) -> String {
        format!("{}{}", self.info().address_url, address)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::Ethereum => "ethereum",
            Chain::Solana => "solana",
            Chain::Bitcoin => "bitcoin",
            Chain::Hyperliquid => "hyperliquid",
        };
        f.write_str(name)
    }
}

impl FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "solana" | "sol" => Ok(Chain::Solana),
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            "hyperliquid" | "hl" | "hype" => Ok(Chain::Hyperliquid),
            other => Err(format!("unknown chain: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_chain_has_info() {
        for chain in Chain::ALL {
            assert!(!chain.info().name.is_empty());
        }
        assert_eq!(Chain::Hyperliquid.info().unit, "USD");
    }

    #[test]
    fn parse_chain_aliases() {
        assert_eq!("ETH".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!(" solana ".parse::<Chain>().unwrap(), Chain::Solana);
        assert_eq!("hl".parse::<Chain>().unwrap(), Chain::Hyperliquid);
        assert!("dogecoin".parse::<Chain>().is_err());
    }

    #[test]
    fn explorer_links() {
        assert_eq!(
            Chain::Ethereum.tx_link("0x999"),
            "https://etherscan.io/tx/0x999"
        );
        assert!(Chain::Solana.address_link("abc").ends_with("/account/abc"));
    }
}
