mod achievements;
mod api;
mod builder;
mod config;
mod db;
mod discipline;
mod error;
mod indexer;
mod journal;
mod models;
mod parser;
mod rpc;
mod state;
#[cfg(test)]
mod testing;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::builder::TradeBuilder;
use crate::indexer::Poller;
use crate::rpc::{HeliusClient, Indexer};
use crate::state::{Journal, Rules};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // RUST_LOG overrides, e.g. RUST_LOG=trade_journal=debug
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Trade journal starting...");

    let cfg = config::load()?;

    let journal = Arc::new(Journal::open(
        db::connect(&cfg.db_path)?,
        Rules::from(&cfg),
        Utc::now(),
    )?);

    let indexer: Arc<dyn Indexer> = Arc::new(HeliusClient::new(
        &cfg.helius_api_url,
        &cfg.helius_rpc_url,
        &cfg.price_api_url,
        &cfg.helius_api_key,
    )?);
    let poller = Arc::new(Poller::new(
        journal.clone(),
        indexer.clone(),
        TradeBuilder::new(indexer),
        Duration::from_secs(cfg.poll_interval_secs),
        cfg.poll_limit,
    ));

    if let Some(address) = &cfg.tracked_wallet {
        if journal.tracked_address().as_deref() != Some(address.as_str()) {
            if let Err(e) = journal.start_tracking(address, Utc::now()) {
                warn!("Ignoring TRACKED_WALLET: {}", e);
            }
        }
    }
    if cfg.auto_track && journal.tracked_address().is_some() {
        poller.start();
    }

    // Spawn API task
    let api_handle = tokio::spawn({
        let state = api::ApiState {
            journal: journal.clone(),
            poller: poller.clone(),
        };
        let port = cfg.port;
        async move { api::serve(port, state).await }
    });

    // Spawn deadline enforcer
    let enforcer_handle = tokio::spawn({
        let journal = journal.clone();
        async move { discipline::run_deadline_enforcer(journal, Duration::from_secs(1)).await }
    });

    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        res = enforcer_handle => match res {
            Ok(Ok(_)) => info!("Deadline enforcer exited"),
            Ok(Err(e)) => error!("Deadline enforcer error: {:?}", e),
            Err(e) => error!("Deadline enforcer panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    poller.stop();
    info!("Trade journal stopped.");
    Ok(())
}
