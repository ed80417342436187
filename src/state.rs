use chrono::{DateTime, Duration, Utc};
use eyre::Result;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{error, info, warn};

use crate::achievements::{self, Achievement};
use crate::config::Config;
use crate::db;
use crate::error::JournalError;
use crate::models::{CooldownState, EscalatingCooldown, PendingTrade, Trade, TrackedWallet, WalletHolding};

/// Discipline settings the journal enforces
#[derive(Debug, Clone)]
pub struct Rules {
    pub log_window: Duration,
    pub penalty_minutes: Vec<i64>,
    pub meditation_cooldown: bool,
    pub consecutive_loss_limit: u32,
    pub loss_cooldown_minutes: i64,
}

impl Default for Rules {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Rules {
    fn from(cfg: &Config) -> Self {
        Self {
            log_window: Duration::seconds(cfg.log_window_secs),
            penalty_minutes: cfg.penalty_minutes.clone(),
            meditation_cooldown: cfg.meditation_cooldown,
            consecutive_loss_limit: cfg.consecutive_loss_limit,
            loss_cooldown_minutes: cfg.loss_cooldown_minutes,
        }
    }
}

/// Everything the journal knows. Only `holdings` and `last_polled_at` are session-only.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub trades: Vec<Trade>,
    pub pending: VecDeque<PendingTrade>,
    pub escalation: EscalatingCooldown,
    pub cooldown: CooldownState,
    pub tracked_wallet: Option<TrackedWallet>,
    pub last_signature: Option<String>,
    pub consecutive_losses: u32,
    pub achievements: Vec<Achievement>,
    pub holdings: Vec<WalletHolding>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl AppState {
    /// Read persisted state once, filling gaps with defaults.
    pub fn load(conn: &Connection, now: DateTime<Utc>) -> Result<Self> {
        let cooldown: CooldownState = db::get_value(conn, db::KEY_COOLDOWN)?.unwrap_or_default();

        Ok(Self {
            trades: db::load_trades(conn)?,
            pending: db::get_value(conn, db::KEY_PENDING)?.unwrap_or_default(),
            escalation: db::get_value(conn, db::KEY_ESCALATION)?.unwrap_or_default(),
            cooldown: cooldown.at(now),
            tracked_wallet: db::get_value(conn, db::KEY_WALLET)?,
            last_signature: db::get_value(conn, db::KEY_LAST_SIGNATURE)?,
            consecutive_losses: db::get_value(conn, db::KEY_LOSSES)?.unwrap_or_default(),
            achievements: achievements::restore(db::get_value(conn, db::KEY_ACHIEVEMENTS)?.unwrap_or_default()),
            holdings: Vec::new(),
            last_polled_at: None,
        })
    }

    pub fn is_known_signature(&self, signature: &str) -> bool {
        self.pending.iter().any(|p| p.trade.signature == signature)
            || self.trades.iter().any(|t| t.signature.as_deref() == Some(signature))
    }
}

/// The single owner of mutable application state.
///
/// Background tasks (poller, deadline enforcer) and API handlers all go through
/// these methods, so each read-modify-write sees the latest values. The state lock
/// is never held across an `.await`.
pub struct Journal {
    pub(crate) state: Mutex<AppState>,
    store: Mutex<Connection>,
    rules: Rules,
}

impl Journal {
    pub fn open(conn: Connection, rules: Rules, now: DateTime<Utc>) -> Result<Self> {
        db::run_migrations(&conn)?;
        let state = AppState::load(&conn, now)?;
        info!(
            "Journal loaded: {} trades, {} pending, {} missed logs",
            state.trades.len(),
            state.pending.len(),
            state.escalation.missed_logs
        );

        Ok(Self {
            state: Mutex::new(state),
            store: Mutex::new(conn),
            rules,
        })
    }

    #[cfg(test)]
    pub fn in_memory(rules: Rules) -> Self {
        let conn = Connection::open_in_memory().expect("in-memory sqlite");
        Self::open(conn, rules, Utc::now()).expect("fresh journal")
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn snapshot(&self) -> AppState {
        self.state.lock().clone()
    }

    pub(crate) fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = db::put_value(&self.store.lock(), key, value) {
            error!("Failed to persist {}: {:?}", key, e);
        }
    }

    pub(crate) fn persist_opt<T: Serialize>(&self, key: &str, value: Option<&T>) {
        let res = match value {
            Some(v) => db::put_value(&self.store.lock(), key, v),
            None => db::delete_value(&self.store.lock(), key),
        };
        if let Err(e) = res {
            error!("Failed to persist {}: {:?}", key, e);
        }
    }

    pub(crate) fn persist_trade(&self, trade: &Trade) {
        match db::insert_trade(&self.store.lock(), trade) {
            Ok(true) => {}
            Ok(false) => warn!("Trade {} was already in the store", trade.id),
            Err(e) => error!("Failed to store trade {}: {:?}", trade.id, e),
        }
    }

    pub(crate) fn wipe_store(&self) {
        if let Err(e) = db::clear_all(&self.store.lock()) {
            error!("Failed to clear store: {:?}", e);
        }
    }

    // ---------- wallet tracking ----------

    /// Track `address`; the next poll establishes a fresh baseline.
    pub fn start_tracking(&self, address: &str, now: DateTime<Utc>) -> Result<TrackedWallet, JournalError> {
        let address = address.trim();
        if !is_valid_solana_address(address) {
            return Err(JournalError::InvalidAddress(address.to_string()));
        }

        let mut state = self.state.lock();
        let wallet = TrackedWallet {
            address: address.to_string(),
            nickname: None,
            added_at: now,
            last_checked: None,
            total_pnl: Default::default(),
            trades_count: state.trades.iter().filter(|t| t.is_from_chain).count() as u32,
        };

        state.tracked_wallet = Some(wallet.clone());
        state.last_signature = None;
        state.holdings.clear();
        self.persist_opt(db::KEY_WALLET, state.tracked_wallet.as_ref());
        self.persist_opt::<String>(db::KEY_LAST_SIGNATURE, None);

        info!("Now tracking {}", short_address(address));
        Ok(wallet)
    }

    pub fn stop_tracking(&self) {
        let mut state = self.state.lock();
        if let Some(wallet) = state.tracked_wallet.take() {
            info!("Stopped tracking {}", short_address(&wallet.address));
        }
        state.last_signature = None;
        state.holdings.clear();
        self.persist_opt::<TrackedWallet>(db::KEY_WALLET, None);
        self.persist_opt::<String>(db::KEY_LAST_SIGNATURE, None);
    }

    pub fn tracked_address(&self) -> Option<String> {
        self.state.lock().tracked_wallet.as_ref().map(|w| w.address.clone())
    }

    /// True while `address` is still the wallet being tracked.
    pub fn is_tracking(&self, address: &str) -> bool {
        self.state
            .lock()
            .tracked_wallet
            .as_ref()
            .is_some_and(|w| w.address == address)
    }

    /// Current wallet and last-seen signature, read fresh for every poll tick.
    pub fn poll_cursor(&self) -> Option<(String, Option<String>)> {
        let state = self.state.lock();
        let wallet = state.tracked_wallet.as_ref()?;
        Some((wallet.address.clone(), state.last_signature.clone()))
    }

    /// Move the last-seen signature forward, unless the wallet changed mid-poll.
    pub fn advance_cursor(&self, wallet: &str, signature: &str, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        match state.tracked_wallet.as_mut() {
            Some(tracked) if tracked.address == wallet => tracked.last_checked = Some(now),
            _ => return false,
        }
        state.last_polled_at = Some(now);

        if state.last_signature.as_deref() != Some(signature) {
            state.last_signature = Some(signature.to_string());
            self.persist_opt(db::KEY_LAST_SIGNATURE, state.last_signature.as_ref());
        }
        self.persist_opt(db::KEY_WALLET, state.tracked_wallet.as_ref());
        true
    }

    pub fn record_holdings(&self, wallet: &str, holdings: Vec<WalletHolding>, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        match state.tracked_wallet.as_mut() {
            Some(tracked) if tracked.address == wallet => tracked.last_checked = Some(now),
            _ => return false,
        }
        state.holdings = holdings;
        state.last_polled_at = Some(now);
        true
    }
}

/// Base58 that decodes to a 32-byte public key
pub fn is_valid_solana_address(address: &str) -> bool {
    (32..=44).contains(&address.len())
        && bs58::decode(address).into_vec().is_ok_and(|bytes| bytes.len() == 32)
}

pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() < 10 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WALLET;

    #[test]
    fn addresses_must_be_32_byte_base58() {
        assert!(is_valid_solana_address(WALLET));
        assert!(is_valid_solana_address(crate::models::SOL_MINT));
        assert!(!is_valid_solana_address("0x65E64963F9C5a663e7d7E986De45A9D8324aC0CE"));
        assert!(!is_valid_solana_address("short"));
        assert!(!is_valid_solana_address("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl"));
    }

    #[test]
    fn short_address_keeps_both_ends() {
        assert_eq!(short_address(WALLET), "7xKX...gAsU");
        assert_eq!(short_address("sig-1"), "sig-1");
        assert_eq!(short_address("aééééééééé"), "aééé...éééé");
    }

    #[test]
    fn tracking_resets_the_cursor_and_guards_stale_wallets() {
        let journal = Journal::in_memory(Rules::default());
        let now = Utc::now();
        journal.start_tracking(WALLET, now).unwrap();
        assert!(journal.advance_cursor(WALLET, "sig-1", now));
        assert_eq!(journal.poll_cursor(), Some((WALLET.to_string(), Some("sig-1".to_string()))));

        // re-tracking starts a new baseline
        journal.start_tracking(WALLET, now).unwrap();
        assert_eq!(journal.poll_cursor(), Some((WALLET.to_string(), None)));

        journal.stop_tracking();
        assert!(!journal.advance_cursor(WALLET, "sig-2", now));
        assert!(!journal.record_holdings(WALLET, Vec::new(), now));
        assert_eq!(journal.poll_cursor(), None);

        assert_eq!(
            journal.start_tracking("nope", now),
            Err(JournalError::InvalidAddress("nope".to_string()))
        );
    }

    #[test]
    fn state_survives_a_restart() {
        let dir = std::env::temp_dir().join(format!("journal-restart-{}.db", std::process::id()));
        let path = dir.to_string_lossy().to_string();
        let _ = std::fs::remove_file(&path);
        let now = Utc::now();

        let open_at = |at: DateTime<Utc>| Journal::open(db::connect(&path).unwrap(), Rules::default(), at).unwrap();

        {
            let journal = open_at(now);
            journal.start_tracking(WALLET, now).unwrap();
            journal.advance_cursor(WALLET, "sig-9", now);
            let cooldown = CooldownState::activate(now, 5, "Missed trade log (1 offense)");
            journal.persist(db::KEY_COOLDOWN, &cooldown);
            journal.state.lock().cooldown = cooldown;
        }

        {
            let journal = open_at(now + Duration::minutes(1));
            assert_eq!(journal.poll_cursor(), Some((WALLET.to_string(), Some("sig-9".to_string()))));
            let cooldown = journal.snapshot().cooldown;
            assert!(cooldown.is_active);
            assert_eq!(cooldown.ends_at, Some(now + Duration::minutes(5)));
            assert_eq!(cooldown.reason, "Missed trade log (1 offense)");
        }

        // reopened after the cooldown ended: it loads as inactive
        let journal = open_at(now + Duration::minutes(6));
        assert_eq!(journal.snapshot().cooldown, CooldownState::default());
        assert_eq!(journal.poll_cursor(), Some((WALLET.to_string(), Some("sig-9".to_string()))));

        drop(journal);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path}{suffix}"));
        }
    }
}
