use eyre::Result;
use std::sync::Arc;
use teloxide::prelude::Bot;
use tokio::sync::RwLock;
use tracing::{info, warn};

mod bot;
mod chain;
mod config;
mod dedup;
mod format;
mod logging;
mod monitor;
mod notifier;
mod prices;
mod providers;
mod state;
mod types;

use bot::Services;
use chain::Chain;
use config::Config;
use monitor::WhaleMonitor;
use notifier::TelegramTransport;
use prices::PriceClient;
use providers::{
    BitcoinProvider, EthereumProvider, HyperliquidClient, ProviderSet, SolanaProvider,
};
use state::State;

#[tokio::main]
async fn main() -> Result<()> {
    // the environment may already be populated without a .env file
    dotenvy::dotenv().ok();
    logging::init_logging();

    let config = Config::from_env()?;
    let bot = Bot::new(&config.telegram_token);
    let state = Arc::new(RwLock::new(State::new()));

    let endpoints = &config.endpoints;
    let hyperliquid = Arc::new(HyperliquidClient::new(
        endpoints.hyperliquid_api.clone(),
        endpoints.hyperliquid_coins.clone(),
    ));
    let mut providers = ProviderSet::new();
    providers.insert(
        Chain::Ethereum,
        Arc::new(EthereumProvider::new(endpoints.ethereum_rpc.clone())),
    );
    providers.insert(
        Chain::Solana,
        Arc::new(SolanaProvider::new(endpoints.solana_rpc.clone())),
    );
    providers.insert(
        Chain::Bitcoin,
        Arc::new(BitcoinProvider::new(endpoints.bitcoin_api.clone())),
    );
    providers.insert(Chain::Hyperliquid, hyperliquid.clone());

    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let monitor = Arc::new(WhaleMonitor::new(
        config.monitor.clone(),
        providers,
        transport,
    ));

    if monitor.init() && config.monitor.autostart {
        monitor.start();
    } else if config.monitor.autostart {
        warn!("whale monitor not started automatically; use /whales start once configured");
    }

    let services = Services {
        monitor: monitor.clone(),
        prices: Arc::new(PriceClient::new()),
        hyperliquid,
    };

    info!("bot dispatcher starting");
    bot::run(bot, state, services).await;

    monitor.shutdown().await;
    info!("bye");
    Ok(())
}
