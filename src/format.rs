//! Message rendering for whale alerts. Output is Telegram HTML.

use chrono::{TimeZone, Utc};

use crate::{chain::Chain, types::Transaction};

/// Shortens an address to `first6...last4`. Addresses of 10 characters or
/// fewer are returned unchanged.
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Formats a number with thousands separators. Whole numbers print without
/// decimals, everything else with two.
pub fn format_amount(value: f64) -> String {
    let negative = value < 0.0;
    let rounded = (value.abs() * 100.0).round() / 100.0;
    let integer = rounded.trunc() as u64;
    let cents = ((rounded - rounded.trunc()) * 100.0).round() as u64;

    let digits = integer.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    if cents == 0 {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{cents:02}")
    }
}

pub fn format_timestamp(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "unknown time".to_string(),
    }
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_value(tx: &Transaction) -> String {
    match tx.chain {
        Chain::Hyperliquid => format!("${}", format_amount(tx.value)),
        chain => format!("{} {}", format_amount(tx.value), chain.info().unit),
    }
}

/// Renders one whale alert.
pub fn format_whale_alert(tx: &Transaction) -> String {
    let info = tx.chain.info();
    let mut msg = format!(
        "🐋 <b>{} Whale Alert</b> {}\n\n<b>Value:</b> {}\n",
        info.name,
        info.emoji,
        format_value(tx)
    );

    if tx.chain == Chain::Hyperliquid {
        if let Some(symbol) = &tx.symbol {
            msg.push_str(&format!("<b>Market:</b> {}\n", escape_html(symbol)));
        }
        if let Some(side) = &tx.side {
            let side = match side.as_str() {
                "B" => "Buy",
                "A" => "Sell",
                other => other,
            };
            msg.push_str(&format!("<b>Side:</b> {}\n", escape_html(side)));
        }
        if let (Some(size), Some(price)) = (tx.size, tx.price) {
            msg.push_str(&format!(
                "<b>Size:</b> {} @ ${}\n",
                format_amount(size),
                format_amount(price)
            ));
        }
    }

    msg.push_str(&format!(
        "<b>From:</b> <code>{}</code>\n<b>To:</b> <code>{}</code>\n\n",
        escape_html(&shorten_address(&tx.from)),
        escape_html(&shorten_address(&tx.to)),
    ));
    msg.push_str(&format!(
        "<a href=\"{}\">View on explorer</a>\n⏰ {}",
        escape_html(&tx.chain.tx_link(&tx.hash)),
        format_timestamp(tx.timestamp)
    ));
    msg
}

/// Message sent when a tick found more transactions than the batch cap.
pub fn format_overflow_summary(remaining: usize) -> String {
    format!("🐋 ... and {remaining} more whale transactions detected this round.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_tx() -> Transaction {
        Transaction::new(
            Chain::Ethereum,
            "0x999",
            "0xabc1234567890",
            "0xdef1234567890",
            150.0,
            1_700_000_000,
        )
    }

    #[test]
    fn test_shorten_address() {
        assert_eq!(shorten_address("0xabc1234567890"), "0xabc1...7890");
        assert_eq!(shorten_address("short"), "short");
        assert_eq!(shorten_address("0123456789"), "0123456789");
        assert_eq!(shorten_address(""), "");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(150.0), "150");
        assert_eq!(format_amount(1_234_567.0), "1,234,567");
        assert_eq!(format_amount(1_500.5), "1,500.50");
        assert_eq!(format_amount(0.126), "0.13");
        assert_eq!(format_amount(-42.0), "-42");
    }

    #[test]
    fn ethereum_alert_contains_expected_fields() {
        let msg = format_whale_alert(&eth_tx());
        assert!(msg.contains("0xabc1...7890"));
        assert!(msg.contains("0xdef1...7890"));
        assert!(msg.contains("150"));
        assert!(msg.contains("ETH"));
        assert!(msg.contains("https://etherscan.io/tx/0x999"));
        assert!(msg.contains("2023-11-14 22:13:20 UTC"));
    }

    #[test]
    fn hyperliquid_alert_uses_usd_and_trade_fields() {
        let mut tx = Transaction::new(
            Chain::Hyperliquid,
            "0xfeed",
            "0x1111111111111111",
            "0x2222222222222222",
            250_000.0,
            1_700_000_000,
        );
        tx.symbol = Some("BTC".to_string());
        tx.side = Some("B".to_string());
        tx.size = Some(2.5);
        tx.price = Some(100_000.0);

        let msg = format_whale_alert(&tx);
        assert!(msg.contains("$250,000"));
        assert!(msg.contains("<b>Market:</b> BTC"));
        assert!(msg.contains("<b>Side:</b> Buy"));
        assert!(msg.contains("2.50 @ $100,000"));
        assert!(!msg.contains("USD"));
    }

    #[test]
    fn short_addresses_are_escaped_not_shortened() {
        let tx = Transaction::new(Chain::Bitcoin, "h", "<a>", "b&c", 12.0, 0);
        let msg = format_whale_alert(&tx);
        assert!(msg.contains("&lt;a&gt;"));
        assert!(msg.contains("b&amp;c"));
        assert!(msg.contains("12 BTC"));
    }

    #[test]
    fn overflow_summary_reports_count() {
        assert!(format_overflow_summary(3).contains("3 more"));
    }
}
