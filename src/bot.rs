use chrono::Utc;
use ethers::types::Address;
use std::{str::FromStr, sync::Arc};
use teloxide::{
    dispatching::{
        dialogue::{self, InMemStorage},
        UpdateHandler,
    },
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    utils::command::BotCommands,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    chain::Chain,
    format::{escape_html, format_amount, format_timestamp},
    monitor::{MonitorStatus, TickOutcome, WhaleMonitor},
    prices::{format_price, PriceClient},
    providers::{hyperliquid::L2Book, HyperliquidClient},
    state::{PaperTrade, State, TradeSide},
};

type MyDialogue = Dialogue<ChatState, InMemStorage<ChatState>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const BOOK_DEPTH: usize = 5;

#[derive(Clone, Default)]
pub enum ChatState {
    #[default]
    Start,
    ReceiveChain,
    ReceiveAddress {
        chain: Chain,
    },
}

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(description = "Commands:", rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "Display all commands")]
    Help,
    #[command(description = "Welcome message")]
    Start,
    #[command(description = "Current USD price, e.g. /price BTC")]
    Price(String),
    #[command(description = "Hyperliquid order book, e.g. /book ETH")]
    Book(String),
    #[command(description = "Whale monitor control: /whales start | stop | status | check")]
    Whales(String),
    #[command(description = "Track a wallet address")]
    Track,
    #[command(description = "Stop tracking a wallet by id. Ids are listed by /wallets")]
    Untrack(u32),
    #[command(description = "List tracked wallets")]
    Wallets,
    #[command(description = "Simulated order, e.g. /trade buy BTC 0.5 (nothing is executed)")]
    Trade(String),
    #[command(description = "List simulated orders")]
    Trades,
    #[command(description = "Cancel wallet tracking process")]
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhalesAction {
    Start,
    Stop,
    Status,
    Check,
}

impl FromStr for WhalesAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "start" | "on" => Ok(WhalesAction::Start),
            "stop" | "off" => Ok(WhalesAction::Stop),
            "" | "status" => Ok(WhalesAction::Status),
            "check" | "now" => Ok(WhalesAction::Check),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Shared services handed to every handler.
#[derive(Clone)]
pub struct Services {
    pub monitor: Arc<WhaleMonitor>,
    pub prices: Arc<PriceClient>,
    pub hyperliquid: Arc<HyperliquidClient>,
}

pub async fn run(bot: Bot, state: Arc<RwLock<State>>, services: Services) {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![
            state,
            services,
            InMemStorage::<ChatState>::new()
        ])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(
            case![ChatState::Start]
                .branch(case![Command::Help].endpoint(help))
                .branch(case![Command::Start].endpoint(start))
                .branch(case![Command::Price(symbol)].endpoint(price))
                .branch(case![Command::Book(coin)].endpoint(book))
                .branch(case![Command::Whales(action)].endpoint(whales))
                .branch(case![Command::Track].endpoint(track))
                .branch(case![Command::Untrack(id)].endpoint(untrack))
                .branch(case![Command::Wallets].endpoint(wallets))
                .branch(case![Command::Trade(args)].endpoint(trade))
                .branch(case![Command::Trades].endpoint(trades)),
        )
        .branch(case![Command::Cancel].endpoint(cancel));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(case![ChatState::ReceiveAddress { chain }].endpoint(receive_address))
        .branch(dptree::endpoint(invalid_state));

    let callback_query_handler = Update::filter_callback_query()
        .branch(case![ChatState::ReceiveChain].endpoint(receive_chain));

    dialogue::enter::<Update, InMemStorage<ChatState>, ChatState, _>()
        .branch(message_handler)
        .branch(callback_query_handler)
}

async fn invalid_state(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Unable to handle the message. Type /help to see the usage.",
    )
    .await?;
    Ok(())
}

async fn cancel(bot: Bot, dialogue: MyDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "Cancelling the tracking process.")
        .await?;
    dialogue.exit().await?;
    Ok(())
}

async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

async fn start(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "🐋 Welcome! I follow large transactions on Ethereum, Solana, Bitcoin and Hyperliquid, \
         and can look up prices and order books.\n\nType /help to see the commands.",
    )
    .await?;
    Ok(())
}

async fn price(bot: Bot, msg: Message, symbol: String, services: Services) -> HandlerResult {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        bot.send_message(msg.chat.id, "Usage: /price <symbol>\nExample: /price BTC")
            .await?;
        return Ok(());
    }
    match services.prices.quote(symbol).await {
        Ok(quote) => {
            bot.send_message(msg.chat.id, quote.format())
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "price lookup failed");
            bot.send_message(msg.chat.id, format!("Could not find a price for {symbol}."))
                .await?;
        }
    }
    Ok(())
}

async fn book(bot: Bot, msg: Message, coin: String, services: Services) -> HandlerResult {
    let coin = coin.trim();
    if coin.is_empty() {
        bot.send_message(msg.chat.id, "Usage: /book <coin>\nExample: /book ETH")
            .await?;
        return Ok(());
    }
    match services.hyperliquid.l2_book(coin).await {
        Ok(book) => {
            bot.send_message(msg.chat.id, format_book(&book))
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Err(e) => {
            warn!(coin = %coin, error = %e, "order book lookup failed");
            bot.send_message(msg.chat.id, format!("Order book for {coin} is unavailable."))
                .await?;
        }
    }
    Ok(())
}

async fn whales(bot: Bot, msg: Message, action: String, services: Services) -> HandlerResult {
    let monitor = &services.monitor;
    let reply = match action.parse::<WhalesAction>() {
        Ok(WhalesAction::Start) => {
            if monitor.start() {
                "🐋 Whale monitor started.".to_string()
            } else {
                "Whale monitor is already running.".to_string()
            }
        }
        Ok(WhalesAction::Stop) => {
            if monitor.stop() {
                "Whale monitor stopped.".to_string()
            } else {
                "Whale monitor is not running.".to_string()
            }
        }
        Ok(WhalesAction::Status) => format_status(&monitor.status()),
        Ok(WhalesAction::Check) => {
            info!(chat = %msg.chat.id, "manual whale check requested");
            describe_outcome(&monitor.tick().await)
        }
        Err(_) => "Usage: /whales start | stop | status | check".to_string(),
    };
    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn track(bot: Bot, dialogue: MyDialogue, msg: Message) -> HandlerResult {
    let chains = Chain::ALL.iter().map(|chain| {
        InlineKeyboardButton::callback(chain.info().name.to_string(), chain.to_string())
    });
    bot.send_message(msg.chat.id, "Select a chain:")
        .reply_markup(InlineKeyboardMarkup::new([chains]))
        .await?;
    dialogue.update(ChatState::ReceiveChain).await?;
    Ok(())
}

async fn receive_chain(bot: Bot, dialogue: MyDialogue, q: CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(q.id).await?;
    if let Some(chain) = q.data.as_deref().and_then(|data| data.parse::<Chain>().ok()) {
        bot.send_message(
            dialogue.chat_id(),
            format!(
                "You've selected {}.\nPlease send the wallet address.",
                chain.info().name
            ),
        )
        .await?;
        dialogue.update(ChatState::ReceiveAddress { chain }).await?;
    }
    Ok(())
}

async fn receive_address(
    bot: Bot,
    dialogue: MyDialogue,
    chain: Chain, // Available from `ChatState::ReceiveAddress`.
    state: Arc<RwLock<State>>,
    msg: Message,
) -> HandlerResult {
    match msg.text().map(str::trim) {
        Some(address) if validate_address(chain, address) => {
            let added = state
                .write()
                .await
                .track_wallet(msg.chat.id, chain, address.to_string());
            let reply = if added {
                "Everything is set. Use /wallets to see your list."
            } else {
                "You are already tracking this wallet."
            };
            bot.send_message(msg.chat.id, reply).await?;
            dialogue.exit().await?;
        }
        Some(_) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "Invalid {} address. Please send a valid address or /cancel.",
                    chain.info().name
                ),
            )
            .await?;
        }
        None => {
            bot.send_message(msg.chat.id, "Please send an address").await?;
        }
    }
    Ok(())
}

async fn untrack(bot: Bot, msg: Message, id: u32, state: Arc<RwLock<State>>) -> HandlerResult {
    let mut state = state.write().await;
    if let Ok(wallet) = state.untrack_wallet(&msg.chat.id, id as usize) {
        bot.send_message(
            msg.chat.id,
            format!("Stopped tracking {}", escape_html(&wallet.address)),
        )
        .parse_mode(ParseMode::Html)
        .await?;
    } else {
        bot.send_message(msg.chat.id, "Error invalid index.").await?;
    }
    Ok(())
}

async fn wallets(bot: Bot, msg: Message, state: Arc<RwLock<State>>) -> HandlerResult {
    let state = state.read().await;
    if let Some(wallets) = state.get_wallets_formatted(&msg.chat.id) {
        bot.send_message(msg.chat.id, format!("<b>Tracked wallets</b>\n{wallets}"))
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true)
            .await?;
    } else {
        bot.send_message(msg.chat.id, "You are not tracking any wallets. Use /track.")
            .await?;
    }
    Ok(())
}

async fn trade(
    bot: Bot,
    msg: Message,
    args: String,
    state: Arc<RwLock<State>>,
    services: Services,
) -> HandlerResult {
    let (side, symbol, amount) = match parse_trade_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            bot.send_message(
                msg.chat.id,
                format!("{e}\nUsage: /trade <buy|sell> <symbol> <amount>"),
            )
            .await?;
            return Ok(());
        }
    };

    let quote = match services.prices.quote(&symbol).await {
        Ok(quote) => quote,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "price lookup for simulated trade failed");
            bot.send_message(msg.chat.id, format!("Could not price {symbol}, nothing recorded."))
                .await?;
            return Ok(());
        }
    };

    let trade = PaperTrade {
        side,
        symbol,
        amount,
        price_usd: quote.price_usd,
        at: Utc::now(),
    };
    let reply = format!("🧪 Simulated order recorded (not executed):\n{trade}");
    state.write().await.record_trade(msg.chat.id, trade);
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn trades(bot: Bot, msg: Message, state: Arc<RwLock<State>>) -> HandlerResult {
    let state = state.read().await;
    if let Some(trades) = state.get_trades_formatted(&msg.chat.id) {
        bot.send_message(msg.chat.id, format!("Simulated orders:\n{trades}"))
            .await?;
    } else {
        bot.send_message(msg.chat.id, "No simulated orders yet.")
            .await?;
    }
    Ok(())
}

pub fn parse_trade_args(args: &str) -> Result<(TradeSide, String, f64), String> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let [side, symbol, amount] = parts.as_slice() else {
        return Err("Expected three arguments.".to_string());
    };
    let side = side.parse::<TradeSide>()?;
    let amount = amount
        .parse::<f64>()
        .ok()
        .filter(|a| a.is_finite() && *a > 0.0)
        .ok_or_else(|| format!("Invalid amount: {amount}"))?;
    Ok((side, symbol.to_uppercase(), amount))
}

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub fn validate_address(chain: Chain, address: &str) -> bool {
    match chain {
        Chain::Ethereum | Chain::Hyperliquid => {
            address.starts_with("0x") && Address::from_str(address).is_ok()
        }
        Chain::Solana => {
            (32..=44).contains(&address.len())
                && address.chars().all(|c| BASE58_ALPHABET.contains(c))
        }
        Chain::Bitcoin => {
            let lower = address.to_lowercase();
            let prefixed = address.starts_with('1')
                || address.starts_with('3')
                || lower.starts_with("bc1");
            prefixed
                && (26..=62).contains(&address.len())
                && address.chars().all(|c| c.is_ascii_alphanumeric())
        }
    }
}

pub fn format_status(status: &MonitorStatus) -> String {
    let chains = status
        .chains
        .iter()
        .map(|c| c.info().name)
        .collect::<Vec<_>>()
        .join(", ");
    let last_run = status
        .last_run
        .map(|t| format_timestamp(t.timestamp()))
        .unwrap_or_else(|| "never".to_string());
    format!(
        "<b>Whale monitor</b>\n\
         Status: {}\n\
         Mode: {} every {}\n\
         Chains: {}\n\
         Last run: {}\n\
         Remembered transactions: {}",
        if status.active { "🟢 active" } else { "⚪ stopped" },
        status.mode,
        status.interval,
        chains,
        last_run,
        status.seen_transactions
    )
}

pub fn describe_outcome(outcome: &TickOutcome) -> String {
    match outcome {
        TickOutcome::ShuttingDown => "Whale monitor is shutting down.".to_string(),
        TickOutcome::NotConfigured => "No alert channel configured (WHALE_CHANNEL_ID).".to_string(),
        TickOutcome::Cooldown => "Checked recently, try again in a few seconds.".to_string(),
        TickOutcome::AllProvidersFailed => "All data providers failed, try again later.".to_string(),
        TickOutcome::NoNewTransactions => "No new whale transactions.".to_string(),
        TickOutcome::Alerted(report) => {
            let mut text = format!("Sent {} whale alert(s) to the channel.", report.sent);
            if report.suppressed > 0 {
                text.push_str(&format!(" {} more were summarised.", report.suppressed));
            }
            if report.failed > 0 {
                text.push_str(&format!(" {} failed to send.", report.failed));
            }
            text
        }
    }
}

pub fn format_book(book: &L2Book) -> String {
    let level = |l: &crate::providers::hyperliquid::BookLevel| {
        format!("{:>14}  {}", format_price(l.px), format_amount(l.sz))
    };
    let asks: Vec<String> = book.asks().iter().take(BOOK_DEPTH).rev().map(level).collect();
    let bids: Vec<String> = book.bids().iter().take(BOOK_DEPTH).map(level).collect();
    let spread = book
        .spread()
        .map(|s| format!("${}", format_price(s)))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "<b>{} order book</b>\n<pre>Asks\n{}\n---- spread {} ----\n{}\nBids</pre>",
        escape_html(&book.coin),
        asks.join("\n"),
        spread,
        bids.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::TickReport;
    use serde_json::json;

    #[test]
    fn parse_commands() {
        assert_eq!(
            Command::parse("/price btc", "whalebot").unwrap(),
            Command::Price("btc".to_string())
        );
        assert_eq!(
            Command::parse("/untrack 2", "whalebot").unwrap(),
            Command::Untrack(2)
        );
        assert_eq!(
            Command::parse("/whales status", "whalebot").unwrap(),
            Command::Whales("status".to_string())
        );
        assert!(Command::parse("/untrack two", "whalebot").is_err());
    }

    #[test]
    fn parse_whales_action() {
        assert_eq!("start".parse::<WhalesAction>().unwrap(), WhalesAction::Start);
        assert_eq!(" OFF ".parse::<WhalesAction>().unwrap(), WhalesAction::Stop);
        assert_eq!("".parse::<WhalesAction>().unwrap(), WhalesAction::Status);
        assert_eq!("check".parse::<WhalesAction>().unwrap(), WhalesAction::Check);
        assert!("explode".parse::<WhalesAction>().is_err());
    }

    #[test]
    fn test_parse_trade_args() {
        assert_eq!(
            parse_trade_args("buy btc 0.5").unwrap(),
            (TradeSide::Buy, "BTC".to_string(), 0.5)
        );
        assert!(parse_trade_args("buy btc").is_err());
        assert!(parse_trade_args("hold btc 1").is_err());
        assert!(parse_trade_args("sell eth -1").is_err());
        assert!(parse_trade_args("sell eth NaN").is_err());
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address(
            Chain::Ethereum,
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"
        ));
        assert!(!validate_address(Chain::Ethereum, "0x1234"));
        assert!(validate_address(
            Chain::Solana,
            "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"
        ));
        assert!(!validate_address(Chain::Solana, "0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl"));
        assert!(validate_address(
            Chain::Bitcoin,
            "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh"
        ));
        assert!(validate_address(Chain::Bitcoin, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(!validate_address(Chain::Bitcoin, "2short"));
    }

    #[test]
    fn describe_alerted_outcome() {
        let text = describe_outcome(&TickOutcome::Alerted(TickReport {
            sent: 5,
            suppressed: 3,
            ..Default::default()
        }));
        assert_eq!(
            text,
            "Sent 5 whale alert(s) to the channel. 3 more were summarised."
        );
    }

    #[test]
    fn status_lists_chains_and_state() {
        let status = MonitorStatus {
            active: true,
            mode: "polling".to_string(),
            interval: "30s".to_string(),
            last_run: None,
            chains: vec![Chain::Ethereum, Chain::Bitcoin],
            seen_transactions: 12,
        };
        let text = format_status(&status);
        assert!(text.contains("🟢 active"));
        assert!(text.contains("polling every 30s"));
        assert!(text.contains("Ethereum, Bitcoin"));
        assert!(text.contains("Last run: never"));
        assert!(text.contains("Remembered transactions: 12"));
    }

    #[test]
    fn book_shows_both_sides_and_spread() {
        let book: L2Book = serde_json::from_value(json!({
            "coin": "ETH",
            "time": 1700000000000u64,
            "levels": [
                [{ "px": "3499.5", "sz": "10", "n": 2 }, { "px": "3499.0", "sz": "4.25", "n": 1 }],
                [{ "px": "3500.5", "sz": "7", "n": 3 }]
            ]
        }))
        .unwrap();
        let text = format_book(&book);
        assert!(text.contains("<b>ETH order book</b>"));
        assert!(text.contains("3,499.50"));
        assert!(text.contains("4.25"));
        assert!(text.contains("spread $1.0000"));
    }
}
