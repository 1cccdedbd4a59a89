use crate::chain::Chain;

/// A large transfer or trade reported by one of the chain providers.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub chain: Chain,
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Native units, or USD notional for hyperliquid trades.
    pub value: f64,
    /// Seconds since epoch.
    pub timestamp: i64,
    pub size: Option<f64>,
    pub price: Option<f64>,
    pub side: Option<String>,
    pub symbol: Option<String>,
}

impl Transaction {
    pub fn new(
        chain: Chain,
        hash: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        value: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            chain,
            hash: hash.into(),
            from: from.into(),
            to: to.into(),
            value,
            timestamp,
            size: None,
            price: None,
            side: None,
            symbol: None,
        }
    }

    /// Key used to remember that this transaction has been alerted.
    pub fn dedup_key(&self) -> TxKey {
        (self.chain, self.hash.clone())
    }
}

pub type TxKey = (Chain, String);
