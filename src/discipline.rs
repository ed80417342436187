use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::db;
use crate::error::JournalError;
use crate::models::{CooldownState, DetectedTrade, EscalatingCooldown, PendingTrade, Trade, TradeOutcome};
use crate::state::{short_address, AppState, Journal};

const MISSED_REASON: &str = "[LOG MISSED]";

/// Penalty for the `missed`-th offence: steps through `table`, then stays on its last entry.
pub fn penalty_minutes(missed: u32, table: &[i64]) -> i64 {
    let idx = (missed.max(1) as usize).min(table.len()).saturating_sub(1);
    table.get(idx).copied().unwrap_or(0)
}

fn offence_reason(missed: u32) -> String {
    format!("Missed trade log ({} offense{})", missed, if missed > 1 { "s" } else { "" })
}

/// Permanent record for a resolved pending trade. Detected trades stay open:
/// there is no exit yet, only the observed entry.
fn journal_entry(pending: &PendingTrade, emotion: &str, passed_checklist: bool, reason: &str, completed: bool) -> Trade {
    let trade = &pending.trade;
    Trade {
        id: trade.signature.clone(),
        signature: Some(trade.signature.clone()),
        token_name: trade.token_symbol.clone(),
        token_mint: Some(trade.token_mint.clone()),
        token_logo: Some(trade.token_logo.clone()),
        trade_type: trade.side.into(),
        entry_price: trade.price_per_token,
        exit_price: Default::default(),
        position_size: trade.total_value,
        trade_reason: reason.to_string(),
        outcome: TradeOutcome::Open,
        emotion: emotion.to_string(),
        timestamp: DateTime::from_timestamp_millis(trade.timestamp).unwrap_or(pending.detected_at),
        passed_checklist,
        pnl: Default::default(),
        pnl_percent: Default::default(),
        is_from_chain: true,
        amount: Some(trade.amount),
        current_price: Some(trade.price_per_token),
        log_completed: completed,
    }
}

impl Journal {
    /// Queue a freshly detected trade. Signatures already pending or logged are ignored.
    pub fn record_detected(&self, trade: DetectedTrade, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        if state.is_known_signature(&trade.signature) {
            info!("Trade {} already known, skipping", short_address(&trade.signature));
            return false;
        }

        info!(
            "🚨 {} detected: {} {} (${}), log within {}s",
            trade.side.as_str(),
            trade.amount.normalize(),
            trade.token_symbol,
            trade.total_value.round_dp(2),
            self.rules().log_window.num_seconds()
        );
        state.pending.push_back(PendingTrade::new(trade, now, self.rules().log_window));
        self.persist(db::KEY_PENDING, &state.pending);
        true
    }

    /// Clears a lapsed cooldown and reports whether one is still running.
    fn settle_cooldown(&self, state: &mut AppState, now: DateTime<Utc>) -> bool {
        if state.cooldown.is_active_at(now) {
            return true;
        }
        if state.cooldown.is_active {
            info!("Cooldown complete ({}), back to trading", state.cooldown.reason);
            state.cooldown = CooldownState::default();
            self.persist(db::KEY_COOLDOWN, &state.cooldown);
        }
        false
    }

    pub fn cooldown(&self, now: DateTime<Utc>) -> CooldownState {
        self.state.lock().cooldown.at(now)
    }

    pub fn escalation(&self) -> EscalatingCooldown {
        self.state.lock().escalation.clone()
    }

    /// The trade the user must log right now; nothing is prompted during a cooldown.
    pub fn current_prompt(&self, now: DateTime<Utc>) -> Option<PendingTrade> {
        let state = self.state.lock();
        if state.cooldown.is_active_at(now) {
            return None;
        }
        state.pending.front().cloned()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Resolve the queue head with the user's journal entry.
    pub fn complete_log(
        &self,
        emotion: &str,
        passed_checklist: bool,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<Trade, JournalError> {
        let mut state = self.state.lock();

        if state.pending.is_empty() {
            return Err(JournalError::NothingPending);
        }
        if self.settle_cooldown(&mut state, now) {
            return Err(JournalError::CooldownActive(state.cooldown.ends_at.unwrap_or(now)));
        }
        if emotion.trim().is_empty() {
            return Err(JournalError::MissingEmotion);
        }

        let Some(head) = state.pending.front() else {
            return Err(JournalError::NothingPending);
        };
        if head.is_expired(now) {
            let signature = head.trade.signature.clone();
            self.miss_head(&mut state, now);
            return Err(JournalError::DeadlinePassed(signature));
        }

        let Some(mut pending) = state.pending.pop_front() else {
            return Err(JournalError::NothingPending);
        };
        pending.log_completed = true;
        let trade = journal_entry(&pending, emotion.trim(), passed_checklist, notes, true);

        state.trades.push(trade.clone());
        if let Some(wallet) = state.tracked_wallet.as_mut() {
            wallet.trades_count += 1;
        }

        self.persist_trade(&trade);
        self.persist(db::KEY_PENDING, &state.pending);
        self.persist_opt(db::KEY_WALLET, state.tracked_wallet.as_ref());
        self.check_achievements(&mut state, now);

        info!(
            "✅ Logged {} {} with discipline (checklist passed: {})",
            pending.trade.side.as_str(),
            pending.trade.token_symbol,
            passed_checklist
        );
        Ok(trade)
    }

    /// One deadline check. Fires the miss for an expired queue head at most once;
    /// does nothing while a cooldown is running.
    pub fn enforce_deadline(&self, now: DateTime<Utc>) -> Option<Trade> {
        let mut state = self.state.lock();
        if self.settle_cooldown(&mut state, now) {
            return None;
        }
        if !state.pending.front().is_some_and(|p| p.is_expired(now)) {
            return None;
        }
        self.miss_head(&mut state, now)
    }

    fn miss_head(&self, state: &mut AppState, now: DateTime<Utc>) -> Option<Trade> {
        let pending = state.pending.pop_front()?;
        let trade = journal_entry(&pending, "Unknown", false, MISSED_REASON, false);
        state.trades.push(trade.clone());

        let missed = state.escalation.missed_logs + 1;
        let minutes = penalty_minutes(missed, &self.rules().penalty_minutes);
        state.escalation = EscalatingCooldown {
            missed_logs: missed,
            current_penalty_minutes: minutes,
            last_missed_at: Some(now),
        };
        state.cooldown = CooldownState::activate(now, minutes, offence_reason(missed));

        self.persist_trade(&trade);
        self.persist(db::KEY_PENDING, &state.pending);
        self.persist(db::KEY_ESCALATION, &state.escalation);
        self.persist(db::KEY_COOLDOWN, &state.cooldown);

        warn!(
            "⏰ Log missed for {} {} (offense #{}), {} minute cooldown",
            pending.trade.side.as_str(),
            pending.trade.token_symbol,
            missed,
            minutes
        );
        Some(trade)
    }
}

/// Drives the deadline countdown once per `period`.
pub async fn run_deadline_enforcer(journal: Arc<Journal>, period: Duration) -> eyre::Result<()> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Deadline enforcer started ({:?} tick)", period);
    loop {
        ticker.tick().await;
        journal.enforce_deadline(Utc::now());
    }
}
