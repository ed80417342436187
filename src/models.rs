// src/models.rs
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Wrapped SOL mint, used as the mint of every native-currency leg
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// One side of a swap, only lives while a transaction is being classified
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLeg {
    pub mint: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub logo: String,
    pub decimals: u8,
}

/// A swap observed on chain for the tracked wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedTrade {
    pub signature: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub token_mint: String,
    pub token_symbol: String,
    pub token_name: String,
    pub token_logo: String,
    pub amount: Decimal,
    pub price_per_token: Decimal, // USD
    pub total_value: Decimal,     // USD
    pub timestamp: i64,           // unix millis
}

/// A detected trade waiting for its mandatory journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTrade {
    pub trade: DetectedTrade,
    pub detected_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub log_completed: bool,
}

impl PendingTrade {
    pub fn new(trade: DetectedTrade, now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            trade,
            detected_at: now,
            deadline_at: now + window,
            log_completed: false,
        }
    }

    pub fn seconds_left(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline_at - now).num_seconds().max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline_at
    }
}

/// Miss bookkeeping; `missed_logs` only ever goes up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalatingCooldown {
    pub missed_logs: u32,
    pub current_penalty_minutes: i64,
    pub last_missed_at: Option<DateTime<Utc>>,
}

impl Default for EscalatingCooldown {
    fn default() -> Self {
        Self {
            missed_logs: 0,
            current_penalty_minutes: 2,
            last_missed_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CooldownState {
    pub is_active: bool,
    pub ends_at: Option<DateTime<Utc>>,
    pub reason: String,
}

impl CooldownState {
    pub fn activate(now: DateTime<Utc>, minutes: i64, reason: impl Into<String>) -> Self {
        Self {
            is_active: true,
            ends_at: Some(now + Duration::minutes(minutes)),
            reason: reason.into(),
        }
    }

    /// An `ends_at` in the past means inactive, whatever the stored flag says.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.ends_at.is_some_and(|end| end > now)
    }

    /// The state as it should be reported at `now`.
    pub fn at(&self, now: DateTime<Utc>) -> Self {
        if self.is_active_at(now) {
            self.clone()
        } else {
            Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    Long,
    Short,
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl From<TradeSide> for TradeType {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => TradeType::Buy,
            TradeSide::Sell => TradeType::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
    Open,
}

/// A permanent journal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub signature: Option<String>,
    pub token_name: String,
    pub token_mint: Option<String>,
    pub token_logo: Option<String>,
    pub trade_type: TradeType,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub position_size: Decimal,
    pub trade_reason: String,
    pub outcome: TradeOutcome,
    pub emotion: String,
    pub timestamp: DateTime<Utc>,
    pub passed_checklist: bool,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
    pub is_from_chain: bool,
    pub amount: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub log_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedWallet {
    pub address: String,
    pub nickname: Option<String>,
    pub added_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    pub total_pnl: Decimal,
    pub trades_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletHolding {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub logo: String,
    pub amount: Decimal,
    pub current_price: Decimal,
}
