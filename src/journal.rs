use chrono::{DateTime, SecondsFormat, Utc};
use csv::WriterBuilder;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::achievements;
use crate::db;
use crate::error::JournalError;
use crate::models::{CooldownState, EscalatingCooldown, Trade, TradeOutcome, TradeType};
use crate::state::Journal;

/// A trade entered by hand in the journal
#[derive(Debug, Clone, Deserialize)]
pub struct ManualTrade {
    pub token_name: String,
    pub trade_type: TradeType,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub position_size: Decimal,
    #[serde(default)]
    pub trade_reason: String,
    pub emotion: String,
    #[serde(default)]
    pub passed_checklist: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub open: usize,
    pub win_rate: u32, // whole percent
    pub total_pnl: Decimal,
    pub average_win: Decimal,
    pub average_loss: Decimal,
    /// Gross wins over gross losses; absent while nothing has lost money
    pub profit_factor: Option<Decimal>,
    pub best_trade: Option<Decimal>,
    pub worst_trade: Option<Decimal>,
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns `(pnl, pnl_percent)`, or `None` when the numbers overflow.
/// Buys are treated as longs and sells as shorts.
pub fn calculate_pnl(trade_type: TradeType, entry: Decimal, exit: Decimal, size: Decimal) -> Option<(Decimal, Decimal)> {
    if entry.is_zero() {
        return Some((Decimal::ZERO, Decimal::ZERO));
    }
    let diff = match trade_type {
        TradeType::Long | TradeType::Buy => exit.checked_sub(entry)?,
        TradeType::Short | TradeType::Sell => entry.checked_sub(exit)?,
    };
    let move_pct = diff.checked_div(entry)?.checked_mul(Decimal::ONE_HUNDRED)?;
    let pnl = move_pct.checked_div(Decimal::ONE_HUNDRED)?.checked_mul(size)?;
    Some((round2(pnl), round2(move_pct)))
}

pub fn stats(trades: &[Trade]) -> JournalStats {
    let count = |outcome: TradeOutcome| trades.iter().filter(|t| t.outcome == outcome).count();
    let wins = count(TradeOutcome::Win);
    let losses = count(TradeOutcome::Loss);
    let open = count(TradeOutcome::Open);

    let gains: Vec<Decimal> = trades.iter().map(|t| t.pnl).filter(|p| *p > Decimal::ZERO).collect();
    let drops: Vec<Decimal> = trades.iter().map(|t| t.pnl).filter(|p| *p < Decimal::ZERO).collect();
    let gross_win: Decimal = gains.iter().sum();
    let gross_loss: Decimal = drops.iter().sum::<Decimal>().abs();

    let average = |values: &Vec<Decimal>, total: Decimal| {
        if values.is_empty() {
            Decimal::ZERO
        } else {
            round2(total / Decimal::from(values.len()))
        }
    };

    let win_rate = if trades.is_empty() {
        0
    } else {
        (wins as f64 / trades.len() as f64 * 100.0).round() as u32
    };

    JournalStats {
        total_trades: trades.len(),
        wins,
        losses,
        open,
        win_rate,
        total_pnl: trades.iter().map(|t| t.pnl).sum(),
        average_win: average(&gains, gross_win),
        average_loss: average(&drops, -gross_loss),
        profit_factor: (!gross_loss.is_zero()).then(|| round2(gross_win / gross_loss)),
        best_trade: trades.iter().map(|t| t.pnl).max(),
        worst_trade: trades.iter().map(|t| t.pnl).min(),
    }
}

const CSV_HEADERS: [&str; 12] = [
    "Date",
    "Token",
    "Type",
    "Entry Price",
    "Exit Price",
    "Position Size",
    "P&L ($)",
    "P&L (%)",
    "Outcome",
    "Emotion",
    "Passed Checklist",
    "Trade Reason",
];

fn type_label(trade_type: TradeType) -> &'static str {
    match trade_type {
        TradeType::Long => "Long",
        TradeType::Short => "Short",
        TradeType::Buy => "BUY",
        TradeType::Sell => "SELL",
    }
}

/// Render the log as CSV, one row per trade in logged order
pub fn export_csv(trades: &[Trade]) -> Result<Vec<u8>, csv::Error> {
    let mut w = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    w.write_record(CSV_HEADERS)?;

    for t in trades {
        w.write_record([
            t.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            t.token_name.clone(),
            type_label(t.trade_type).to_string(),
            t.entry_price.to_string(),
            t.exit_price.to_string(),
            t.position_size.to_string(),
            t.pnl.to_string(),
            t.pnl_percent.to_string(),
            format!("{:?}", t.outcome),
            t.emotion.clone(),
            if t.passed_checklist { "Yes" } else { "No" }.to_string(),
            t.trade_reason.clone(),
        ])?;
    }

    w.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

impl Journal {
    pub fn trades(&self) -> Vec<Trade> {
        self.state.lock().trades.clone()
    }

    pub fn stats(&self) -> JournalStats {
        stats(&self.state.lock().trades)
    }

    pub fn export_csv(&self) -> Result<Vec<u8>, csv::Error> {
        export_csv(&self.state.lock().trades)
    }

    pub fn add_manual_trade(&self, input: ManualTrade, now: DateTime<Utc>) -> Result<Trade, JournalError> {
        if input.token_name.trim().is_empty() {
            return Err(JournalError::InvalidTrade("token name is required"));
        }
        if input.entry_price <= Decimal::ZERO || input.exit_price < Decimal::ZERO {
            return Err(JournalError::InvalidTrade("prices must be positive"));
        }
        if input.position_size <= Decimal::ZERO {
            return Err(JournalError::InvalidTrade("position size must be positive"));
        }
        if input.emotion.trim().is_empty() {
            return Err(JournalError::MissingEmotion);
        }

        let mut state = self.state.lock();
        if state.cooldown.is_active_at(now) {
            return Err(JournalError::CooldownActive(state.cooldown.ends_at.unwrap_or(now)));
        }

        let (pnl, pnl_percent) =
            calculate_pnl(input.trade_type, input.entry_price, input.exit_price, input.position_size)
                .ok_or(JournalError::InvalidTrade("prices or size are too large"))?;
        let outcome = if pnl >= Decimal::ZERO { TradeOutcome::Win } else { TradeOutcome::Loss };

        let trade = Trade {
            id: format!("manual-{}-{}", now.timestamp_millis(), state.trades.len()),
            signature: None,
            token_name: input.token_name.trim().to_uppercase(),
            token_mint: None,
            token_logo: None,
            trade_type: input.trade_type,
            entry_price: input.entry_price,
            exit_price: input.exit_price,
            position_size: input.position_size,
            trade_reason: input.trade_reason,
            outcome,
            emotion: input.emotion.trim().to_string(),
            timestamp: now,
            passed_checklist: input.passed_checklist,
            pnl,
            pnl_percent,
            is_from_chain: false,
            amount: None,
            current_price: None,
            log_completed: true,
        };
        state.trades.push(trade.clone());
        self.persist_trade(&trade);

        if outcome == TradeOutcome::Loss {
            state.consecutive_losses += 1;
            let rules = self.rules();
            if rules.meditation_cooldown && state.consecutive_losses >= rules.consecutive_loss_limit {
                let reason = format!("{} consecutive losses", state.consecutive_losses);
                warn!("🧘 {}, {} minute cooldown", reason, rules.loss_cooldown_minutes);
                state.cooldown = CooldownState::activate(now, rules.loss_cooldown_minutes, reason);
                self.persist(db::KEY_COOLDOWN, &state.cooldown);
            }
        } else {
            state.consecutive_losses = 0;
        }
        self.persist(db::KEY_LOSSES, &state.consecutive_losses);
        self.check_achievements(&mut state, now);

        info!("Journaled {} {:?}: {:?} ({})", trade.token_name, trade.trade_type, outcome, pnl);
        Ok(trade)
    }

    /// Wipe the journal. The tracked wallet stays; the next poll re-baselines.
    pub fn clear_data(&self) {
        let mut state = self.state.lock();
        state.trades.clear();
        state.pending.clear();
        state.consecutive_losses = 0;
        state.cooldown = CooldownState::default();
        state.escalation = EscalatingCooldown::default();
        state.last_signature = None;
        state.achievements = achievements::catalog();
        if let Some(wallet) = state.tracked_wallet.as_mut() {
            wallet.trades_count = 0;
        }

        self.wipe_store();
        self.persist_opt(db::KEY_WALLET, state.tracked_wallet.as_ref());
        warn!("All journal data cleared");
    }
}
