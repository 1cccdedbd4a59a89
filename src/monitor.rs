//! Whale monitor.
//!
//! A single timer task polls every provider on a fixed interval, drops
//! transactions that were already alerted, and forwards at most `batch_cap`
//! fresh ones per tick to the alert channel. Provider and transport failures
//! are logged and never stop the loop; the next tick simply polls again.

use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval, sleep, timeout, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    chain::Chain,
    config::MonitorConfig,
    dedup::DedupCache,
    format::{format_overflow_summary, format_whale_alert},
    notifier::{SendOptions, Transport},
    providers::{ProviderError, ProviderSet},
    types::{Transaction, TxKey},
};

#[derive(Default)]
struct MonitorState {
    running: bool,
    shutting_down: bool,
    /// Milliseconds since epoch of the last tick that passed the cooldown.
    last_run_ms: Option<i64>,
    stop_signal: Option<oneshot::Sender<()>>,
    timer_task: Option<JoinHandle<()>>,
    /// Bumped by every `stop()`. A timer tick abandons its batch once the
    /// generation it started under is gone.
    generation: u64,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    ShuttingDown,
    NotConfigured,
    Cooldown,
    AllProvidersFailed,
    NoNewTransactions,
    Alerted(TickReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
    /// Fresh transactions over the batch cap, marked seen without an alert.
    pub suppressed: usize,
    pub provider_errors: usize,
    /// Stop or shutdown was requested while the batch was being sent.
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct MonitorStatus {
    pub active: bool,
    pub mode: String,
    pub interval: String,
    pub last_run: Option<DateTime<Utc>>,
    pub chains: Vec<Chain>,
    pub seen_transactions: usize,
}

pub struct WhaleMonitor {
    config: MonitorConfig,
    providers: ProviderSet,
    transport: Arc<dyn Transport>,
    seen: Mutex<DedupCache<TxKey>>,
    state: Mutex<MonitorState>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn humanize_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

impl WhaleMonitor {
    pub fn new(config: MonitorConfig, providers: ProviderSet, transport: Arc<dyn Transport>) -> Self {
        let seen = DedupCache::new(config.dedup_capacity, config.dedup_evict_batch);
        Self {
            config,
            providers,
            transport,
            seen: Mutex::new(seen),
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Logs the effective setup. Returns false when the monitor cannot
    /// deliver anything (no channel or no providers).
    pub fn init(&self) -> bool {
        let chains: Vec<String> = self.providers.keys().map(|c| c.to_string()).collect();
        info!(
            chains = %chains.join(","),
            interval = %humanize_duration(self.config.interval),
            cooldown = %humanize_duration(self.config.cooldown),
            batch_cap = self.config.batch_cap,
            "whale monitor initialised"
        );
        for chain in self.providers.keys() {
            debug!(chain = %chain, min_value = self.config.threshold(*chain), "threshold");
        }
        if self.config.channel_id.is_none() {
            warn!("WHALE_CHANNEL_ID not set; whale alerts will not be delivered");
            return false;
        }
        if self.providers.is_empty() {
            warn!("no chain providers configured");
            return false;
        }
        true
    }

    /// Starts the polling timer. Returns false if already running or shut
    /// down.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if state.running {
            debug!("whale monitor already running");
            return false;
        }
        if state.shutting_down {
            warn!("whale monitor has been shut down; refusing to start");
            return false;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let monitor = Arc::clone(self);
        let generation = state.generation;
        state.timer_task = Some(tokio::spawn(async move {
            monitor.run_timer(stop_rx, generation).await
        }));
        state.stop_signal = Some(stop_tx);
        state.running = true;
        info!(interval = %humanize_duration(self.config.interval), "whale monitor started");
        true
    }

    /// Cancels the timer. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if !state.running {
            return false;
        }
        state.running = false;
        state.generation += 1;
        if let Some(signal) = state.stop_signal.take() {
            let _ = signal.send(());
        }
        info!("whale monitor stopped");
        true
    }

    /// Stops the timer, waits for an in-flight tick to wind down and forgets
    /// every seen transaction. Safe to call more than once.
    pub async fn shutdown(&self) {
        let timer_task = {
            let mut state = self.state.lock();
            state.shutting_down = true;
            state.timer_task.take()
        };
        self.stop();
        if let Some(task) = timer_task {
            if let Err(e) = task.await {
                warn!(error = %e, "whale monitor timer task ended abnormally");
            }
        }
        self.seen.lock().clear();
        info!("whale monitor shut down");
    }

    pub fn status(&self) -> MonitorStatus {
        let (active, last_run_ms) = {
            let state = self.state.lock();
            (state.running, state.last_run_ms)
        };
        MonitorStatus {
            active,
            mode: "polling".to_string(),
            interval: humanize_duration(self.config.interval),
            last_run: last_run_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            chains: self.providers.keys().copied().collect(),
            seen_transactions: self.seen.lock().len(),
        }
    }

    pub fn has_seen(&self, key: &TxKey) -> bool {
        self.seen.lock().contains(key)
    }

    async fn run_timer(&self, mut stop_rx: oneshot::Receiver<()>, generation: u64) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let outcome = self.run_tick(now_ms(), Some(generation)).await;
                    debug!(?outcome, "whale tick finished");
                }
            }
        }
        debug!("whale monitor timer exited");
    }

    /// Runs one tick now. Used for manual checks, so it keeps going while
    /// the timer is stopped; the cooldown still applies.
    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(now_ms()).await
    }

    pub(crate) async fn tick_at(&self, now_ms: i64) -> TickOutcome {
        self.run_tick(now_ms, None).await
    }

    /// `timer` carries the generation of the timer that issued the tick.
    async fn run_tick(&self, now_ms: i64, timer: Option<u64>) -> TickOutcome {
        if self.is_shutting_down() {
            self.stop();
            return TickOutcome::ShuttingDown;
        }
        let Some(channel_id) = self.config.channel_id.as_deref() else {
            warn!("whale tick skipped: no destination channel configured");
            return TickOutcome::NotConfigured;
        };

        // check-and-set under one lock so overlapping ticks cannot both pass
        {
            let mut state = self.state.lock();
            let cooldown_ms = self.config.cooldown.as_millis() as i64;
            if state
                .last_run_ms
                .is_some_and(|last| now_ms - last < cooldown_ms)
            {
                debug!("whale tick skipped: cooldown active");
                return TickOutcome::Cooldown;
            }
            state.last_run_ms = Some(now_ms);
        }

        let (merged, provider_errors) = self.fetch_all().await;
        if !self.providers.is_empty() && provider_errors == self.providers.len() {
            error!("all whale providers failed; skipping this round");
            return TickOutcome::AllProvidersFailed;
        }

        let fresh: Vec<Transaction> = {
            let seen = self.seen.lock();
            let mut batch_keys = HashSet::new();
            merged
                .into_iter()
                .filter(|tx| {
                    let key = tx.dedup_key();
                    !seen.contains(&key) && batch_keys.insert(key)
                })
                .collect()
        };
        if fresh.is_empty() {
            debug!(provider_errors, "no new whale transactions");
            return TickOutcome::NoNewTransactions;
        }

        let mut report = TickReport {
            provider_errors,
            ..Default::default()
        };
        let cap = self.config.batch_cap;

        for (i, tx) in fresh.iter().take(cap).enumerate() {
            if i > 0 {
                sleep(self.config.send_delay).await;
            }
            if self.should_abandon(timer) {
                info!(sent = report.sent, "monitor stopped; abandoning whale batch");
                report.interrupted = true;
                return TickOutcome::Alerted(report);
            }
            self.seen.lock().insert(tx.dedup_key());
            let message = format_whale_alert(tx);
            match self.transport.send(channel_id, &message, SendOptions::default()).await {
                Ok(()) => {
                    info!(chain = %tx.chain, hash = %tx.hash, value = tx.value, "whale alert sent");
                    report.sent += 1;
                }
                Err(e) => {
                    error!(chain = %tx.chain, hash = %tx.hash, error = %e, "failed to send whale alert");
                    report.failed += 1;
                }
            }
        }

        if fresh.len() > cap {
            let remaining = &fresh[cap..];
            {
                let mut seen = self.seen.lock();
                for tx in remaining {
                    seen.insert(tx.dedup_key());
                }
            }
            report.suppressed = remaining.len();

            sleep(self.config.send_delay).await;
            if self.should_abandon(timer) {
                report.interrupted = true;
                return TickOutcome::Alerted(report);
            }
            let summary = format_overflow_summary(remaining.len());
            if let Err(e) = self.transport.send(channel_id, &summary, SendOptions::default()).await {
                error!(error = %e, "failed to send whale summary");
            }
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            suppressed = report.suppressed,
            provider_errors = report.provider_errors,
            "whale round complete"
        );
        TickOutcome::Alerted(report)
    }

    fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    fn should_abandon(&self, timer: Option<u64>) -> bool {
        let state = self.state.lock();
        state.shutting_down || timer.is_some_and(|generation| generation != state.generation)
    }

    /// Queries every provider concurrently. Results are merged in chain
    /// order; failed chains contribute nothing.
    async fn fetch_all(&self) -> (Vec<Transaction>, usize) {
        let limit = self.config.fetch_limit;
        let provider_timeout = self.config.provider_timeout;
        let calls = self.providers.iter().map(|(chain, provider)| {
            let min_value = self.config.threshold(*chain);
            async move {
                let result = match timeout(
                    provider_timeout,
                    provider.fetch_large_transactions(min_value, limit),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(provider_timeout.as_secs())),
                };
                (*chain, result)
            }
        });

        let mut merged = Vec::new();
        let mut errors = 0;
        for (chain, result) in join_all(calls).await {
            match result {
                Ok(txs) => {
                    debug!(chain = %chain, count = txs.len(), "provider returned transactions");
                    merged.extend(txs);
                }
                Err(e) => {
                    error!(chain = %chain, error = %e, "whale provider failed");
                    errors += 1;
                }
            }
        }
        (merged, errors)
    }
}
