use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::builder::TradeBuilder;
use crate::error::IndexerError;
use crate::parser;
use crate::rpc::Indexer;
use crate::state::{short_address, Journal};

/// Watches the tracked wallet and feeds new swaps into the pending queue.
///
/// Every tick re-reads the wallet and cursor from the journal, and re-checks
/// that the wallet is still tracked after each network call. Results that
/// belong to a wallet the user has since switched away from are dropped.
pub struct Poller {
    journal: Arc<Journal>,
    indexer: Arc<dyn Indexer>,
    builder: TradeBuilder,
    period: Duration,
    limit: usize,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(
        journal: Arc<Journal>,
        indexer: Arc<dyn Indexer>,
        builder: TradeBuilder,
        period: Duration,
        limit: usize,
    ) -> Self {
        Self {
            journal,
            indexer,
            builder,
            period,
            limit,
            task: Mutex::new(None),
        }
    }

    /// Spawn the polling loop. Returns false if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Poller already running");
            return false;
        }

        let poller = Arc::clone(self);
        *task = Some(tokio::spawn(async move { poller.run().await }));
        info!("Poller started ({:?} interval, {} tx per poll)", self.period, self.limit);
        true
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!("Poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    async fn run(&self) {
        let mut ticker = interval(self.period);
        // a slow tick pushes the next one back instead of bunching them up
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One poll: new trades first, then the holdings refresh. Returns how many trades were queued.
    pub async fn tick(&self) -> usize {
        let queued = match self.poll_transactions().await {
            Ok(n) => n,
            Err(e) => {
                warn!("Poll failed, cursor left in place: {}", e);
                0
            }
        };
        self.refresh_holdings().await;
        queued
    }

    async fn poll_transactions(&self) -> Result<usize, IndexerError> {
        let Some((wallet, last_seen)) = self.journal.poll_cursor() else {
            return Ok(0);
        };
        debug!("Polling {} (last seen {:?})", short_address(&wallet), last_seen.as_deref().map(short_address));

        let batch = self.indexer.fetch_transactions(&wallet, None, self.limit).await?;
        if !self.journal.is_tracking(&wallet) {
            debug!("Discarding poll for {}, no longer tracked", short_address(&wallet));
            return Ok(0);
        }

        let Some(newest) = batch.first().map(|tx| tx.signature.clone()) else {
            return Ok(0);
        };

        let Some(last_seen) = last_seen else {
            // first poll only marks where history ends
            info!("Baseline for {} set at {}", short_address(&wallet), short_address(&newest));
            self.journal.advance_cursor(&wallet, &newest, Utc::now());
            return Ok(0);
        };

        let fresh: Vec<_> = batch.iter().take_while(|tx| tx.signature != last_seen).collect();
        if !fresh.is_empty() {
            debug!("{} new transactions for {}", fresh.len(), short_address(&wallet));
        }

        let mut queued = 0;
        for tx in fresh.into_iter().rev() {
            let Some(legs) = parser::classify(tx, &wallet) else {
                debug!("{} is not a swap, skipping", short_address(&tx.signature));
                continue;
            };
            let Some(trade) = self.builder.build(tx, &legs).await else {
                continue;
            };
            if !self.journal.is_tracking(&wallet) {
                debug!("Wallet changed mid-poll, dropping {}", short_address(&tx.signature));
                return Ok(queued);
            }
            if self.journal.record_detected(trade, Utc::now()) {
                queued += 1;
            }
        }

        self.journal.advance_cursor(&wallet, &newest, Utc::now());
        Ok(queued)
    }

    /// Reload balances for the tracked wallet. A failed lookup keeps the last known holdings.
    pub async fn refresh_holdings(&self) -> bool {
        let Some(wallet) = self.journal.tracked_address() else {
            return false;
        };

        match self.indexer.assets_by_owner(&wallet).await {
            Ok(holdings) => {
                debug!("{} holdings for {}", holdings.len(), short_address(&wallet));
                self.journal.record_holdings(&wallet, holdings, Utc::now())
            }
            Err(e) => {
                warn!("Holdings refresh failed for {}: {}", short_address(&wallet), e);
                false
            }
        }
    }
}
