use chrono::{DateTime, Utc};
use eyre::{eyre, Result};
use std::{collections::HashMap, fmt};
use teloxide::types::ChatId;

use crate::{chain::Chain, format::format_amount, prices::format_price};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedWallet {
    pub chain: Chain,
    pub address: String,
}

impl fmt::Display for TrackedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <a href=\"{}\">{}</a>",
            self.chain.info().name,
            self.chain.address_link(&self.address),
            self.address
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::str::FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "long" => Ok(TradeSide::Buy),
            "sell" | "short" => Ok(TradeSide::Sell),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// A simulated order. Nothing is ever sent to an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperTrade {
    pub side: TradeSide,
    pub symbol: String,
    pub amount: f64,
    pub price_usd: f64,
    pub at: DateTime<Utc>,
}

impl PaperTrade {
    pub fn notional(&self) -> f64 {
        self.amount * self.price_usd
    }
}

impl fmt::Display for PaperTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        };
        write!(
            f,
            "{} {} {} @ ${} (${}) {}",
            side,
            self.amount,
            self.symbol,
            format_price(self.price_usd),
            format_amount(self.notional()),
            self.at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Per-chat bookkeeping. Lives only as long as the process.
#[derive(Debug, Default)]
pub struct State {
    pub wallets: HashMap<ChatId, Vec<TrackedWallet>>,
    pub trades: HashMap<ChatId, Vec<PaperTrade>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the chat already tracks this wallet.
    pub fn track_wallet(&mut self, chat: ChatId, chain: Chain, address: String) -> bool {
        let wallets = self.wallets.entry(chat).or_default();
        if wallets
            .iter()
            .any(|w| w.chain == chain && w.address.eq_ignore_ascii_case(&address))
        {
            return false;
        }
        wallets.push(TrackedWallet { chain, address });
        true
    }

    pub fn untrack_wallet(&mut self, chat: &ChatId, index: usize) -> Result<TrackedWallet> {
        if let Some(wallets) = self.wallets.get_mut(chat) {
            if index < wallets.len() {
                Ok(wallets.remove(index))
            } else {
                Err(eyre!("index out of bounds"))
            }
        } else {
            Err(eyre!("No tracked wallets"))
        }
    }

    pub fn get_wallets_formatted(&self, chat: &ChatId) -> Option<String> {
        let wallets = self.wallets.get(chat)?;
        if wallets.is_empty() {
            return None;
        }
        Some(
            wallets
                .iter()
                .enumerate()
                .map(|(i, w)| format!("{i}. {w}"))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    pub fn record_trade(&mut self, chat: ChatId, trade: PaperTrade) {
        self.trades.entry(chat).or_default().push(trade);
    }

    pub fn get_trades_formatted(&self, chat: &ChatId) -> Option<String> {
        let trades = self.trades.get(chat)?;
        if trades.is_empty() {
            return None;
        }
        Some(
            trades
                .iter()
                .enumerate()
                .map(|(i, t)| format!("{i}. {t}"))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn track_and_untrack_wallets() {
        let mut state = State::new();
        let chat = ChatId(1);
        assert!(state.track_wallet(chat, Chain::Ethereum, "0xAbC".to_string()));
        assert!(!state.track_wallet(chat, Chain::Ethereum, "0xabc".to_string()));
        assert!(state.track_wallet(chat, Chain::Solana, "0xabc".to_string()));

        let listing = state.get_wallets_formatted(&chat).unwrap();
        assert!(listing.starts_with("0. Ethereum"));
        assert!(listing.contains("https://solscan.io/account/0xabc"));

        let removed = state.untrack_wallet(&chat, 0).unwrap();
        assert_eq!(removed.chain, Chain::Ethereum);
        assert!(state.untrack_wallet(&chat, 5).is_err());
        assert!(state.untrack_wallet(&ChatId(2), 0).is_err());
    }

    #[test]
    fn empty_lists_format_as_none() {
        let mut state = State::new();
        let chat = ChatId(7);
        assert!(state.get_wallets_formatted(&chat).is_none());
        state.track_wallet(chat, Chain::Bitcoin, "bc1q".to_string());
        state.untrack_wallet(&chat, 0).unwrap();
        assert!(state.get_wallets_formatted(&chat).is_none());
        assert!(state.get_trades_formatted(&chat).is_none());
    }

    #[test]
    fn paper_trades_are_recorded() {
        let mut state = State::new();
        let chat = ChatId(3);
        state.record_trade(
            chat,
            PaperTrade {
                side: TradeSide::Buy,
                symbol: "BTC".to_string(),
                amount: 0.5,
                price_usd: 100_000.0,
                at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            },
        );
        let listing = state.get_trades_formatted(&chat).unwrap();
        assert_eq!(
            listing,
            "0. BUY 0.5 BTC @ $100,000 ($50,000) 2023-11-14 22:13 UTC"
        );
    }

    #[test]
    fn parse_trade_side() {
        assert_eq!("BUY".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!("short".parse::<TradeSide>().unwrap(), TradeSide::Sell);
        assert!("hold".parse::<TradeSide>().is_err());
    }
}
