use dotenvy::dotenv;
use eyre::Result;
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_PENALTIES: [i64; 5] = [2, 5, 10, 20, 60];

#[derive(Clone)]
pub struct Config {
    pub helius_api_key: String,
    pub helius_api_url: String,  // REST: transactions, token metadata
    pub helius_rpc_url: String,  // JSON-RPC: getAssetsByOwner
    pub price_api_url: String,
    pub db_path: String,
    pub port: u16,
    pub poll_interval_secs: u64,
    pub poll_limit: usize,
    pub log_window_secs: i64,
    pub penalty_minutes: Vec<i64>,
    pub meditation_cooldown: bool,
    pub consecutive_loss_limit: u32,
    pub loss_cooldown_minutes: i64,
    pub auto_track: bool,
    pub tracked_wallet: Option<String>,
}

// the API key stays out of logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("helius_api_url", &self.helius_api_url)
            .field("helius_rpc_url", &self.helius_rpc_url)
            .field("price_api_url", &self.price_api_url)
            .field("db_path", &self.db_path)
            .field("port", &self.port)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("poll_limit", &self.poll_limit)
            .field("log_window_secs", &self.log_window_secs)
            .field("penalty_minutes", &self.penalty_minutes)
            .field("meditation_cooldown", &self.meditation_cooldown)
            .field("consecutive_loss_limit", &self.consecutive_loss_limit)
            .field("loss_cooldown_minutes", &self.loss_cooldown_minutes)
            .field("auto_track", &self.auto_track)
            .field("tracked_wallet", &self.tracked_wallet)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            helius_api_key: String::new(),
            helius_api_url: "https://api.helius.xyz/v0".to_string(),
            helius_rpc_url: "https://mainnet.helius-rpc.com".to_string(),
            price_api_url: "https://price.jup.ag/v4/price".to_string(),
            db_path: "journal.db".to_string(),
            port: 8080,
            poll_interval_secs: 15,
            poll_limit: 15,
            log_window_secs: 120,
            penalty_minutes: DEFAULT_PENALTIES.to_vec(),
            meditation_cooldown: true,
            consecutive_loss_limit: 3,
            loss_cooldown_minutes: 15,
            auto_track: true,
            tracked_wallet: None,
        }
    }
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a comma separated penalty table, e.g. "2,5,10,20,60".
/// Any bad entry (or an empty list) falls back to the default table.
pub fn parse_penalties(raw: &str) -> Vec<i64> {
    let parsed: Option<Vec<i64>> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().ok().filter(|m| *m > 0))
        .collect();

    match parsed {
        Some(table) if !table.is_empty() => table,
        _ => DEFAULT_PENALTIES.to_vec(),
    }
}

pub fn load() -> Result<Config> {
    dotenv().ok(); // .env is optional

    let defaults = Config::default();

    let helius_api_key = env::var("HELIUS_API_KEY").unwrap_or_default();
    if helius_api_key.is_empty() {
        warn!("HELIUS_API_KEY is not set, indexer calls will be rejected");
    }

    let cfg = Config {
        helius_api_key,
        helius_api_url: env::var("HELIUS_API_URL").unwrap_or(defaults.helius_api_url),
        helius_rpc_url: env::var("HELIUS_RPC_URL").unwrap_or(defaults.helius_rpc_url),
        price_api_url: env::var("PRICE_API_URL").unwrap_or(defaults.price_api_url),
        db_path: env::var("DATABASE_URL").unwrap_or(defaults.db_path),
        port: parsed_or("PORT", defaults.port),
        poll_interval_secs: parsed_or("POLL_INTERVAL_SECS", defaults.poll_interval_secs).max(1),
        poll_limit: parsed_or("POLL_LIMIT", defaults.poll_limit).max(1),
        log_window_secs: parsed_or("LOG_WINDOW_SECS", defaults.log_window_secs),
        penalty_minutes: env::var("COOLDOWN_PENALTIES")
            .map(|raw| parse_penalties(&raw))
            .unwrap_or(defaults.penalty_minutes),
        meditation_cooldown: parsed_or("MEDITATION_COOLDOWN", defaults.meditation_cooldown),
        consecutive_loss_limit: parsed_or("CONSECUTIVE_LOSS_LIMIT", defaults.consecutive_loss_limit),
        loss_cooldown_minutes: parsed_or("LOSS_COOLDOWN_MINUTES", defaults.loss_cooldown_minutes),
        auto_track: parsed_or("AUTO_TRACK", defaults.auto_track),
        tracked_wallet: env::var("TRACKED_WALLET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalty_table_parses_and_falls_back() {
        assert_eq!(parse_penalties("1, 3,9"), vec![1, 3, 9]);
        assert_eq!(parse_penalties(""), DEFAULT_PENALTIES.to_vec());
        assert_eq!(parse_penalties("2,five,10"), DEFAULT_PENALTIES.to_vec());
        assert_eq!(parse_penalties("0,5"), DEFAULT_PENALTIES.to_vec());
    }
}
