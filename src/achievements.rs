use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::db;
use crate::models::{Trade, TradeOutcome};
use crate::state::{AppState, Journal};

const LEGEND_ID: &str = "samurai_legend";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Legendary,
}

struct Definition {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    requirement: &'static str,
    tier: Tier,
    max_progress: u32,
}

const CATALOG: &[Definition] = &[
    Definition {
        id: "first_blood",
        name: "First Blood",
        description: "Record your first trade",
        requirement: "1 trade",
        tier: Tier::Bronze,
        max_progress: 1,
    },
    Definition {
        id: "triple_strike",
        name: "Triple Strike",
        description: "Complete 3 trades in one day",
        requirement: "3 trades in a day",
        tier: Tier::Bronze,
        max_progress: 3,
    },
    Definition {
        id: "first_victory",
        name: "First Victory",
        description: "Win your first trade",
        requirement: "1 winning trade",
        tier: Tier::Bronze,
        max_progress: 1,
    },
    Definition {
        id: "discipline_initiate",
        name: "Discipline Initiate",
        description: "Complete a trade with full checklist",
        requirement: "1 disciplined trade",
        tier: Tier::Bronze,
        max_progress: 1,
    },
    Definition {
        id: "winning_streak_5",
        name: "Hot Streak",
        description: "Win 5 trades in a row",
        requirement: "5 consecutive wins",
        tier: Tier::Silver,
        max_progress: 5,
    },
    Definition {
        id: "century_warrior",
        name: "Century Warrior",
        description: "Complete 100 total trades",
        requirement: "100 trades",
        tier: Tier::Silver,
        max_progress: 100,
    },
    Definition {
        id: "zen_master",
        name: "Zen Master",
        description: "Trade while calm 10 times",
        requirement: "10 calm trades",
        tier: Tier::Silver,
        max_progress: 10,
    },
    Definition {
        id: "profit_hunter",
        name: "Profit Hunter",
        description: "Accumulate $1,000 in profits",
        requirement: "$1,000 total profit",
        tier: Tier::Silver,
        max_progress: 1_000,
    },
    Definition {
        id: "week_warrior",
        name: "Week Warrior",
        description: "Maintain a 7-day discipline streak",
        requirement: "7-day streak",
        tier: Tier::Silver,
        max_progress: 7,
    },
    Definition {
        id: "winning_streak_10",
        name: "Unstoppable",
        description: "Win 10 trades in a row",
        requirement: "10 consecutive wins",
        tier: Tier::Gold,
        max_progress: 10,
    },
    Definition {
        id: "discipline_master",
        name: "Discipline Master",
        description: "Complete 50 trades with full checklist",
        requirement: "50 disciplined trades",
        tier: Tier::Gold,
        max_progress: 50,
    },
    Definition {
        id: "profit_lord",
        name: "Profit Lord",
        description: "Accumulate $10,000 in profits",
        requirement: "$10,000 total profit",
        tier: Tier::Gold,
        max_progress: 10_000,
    },
    Definition {
        id: "month_master",
        name: "Month Master",
        description: "Maintain a 30-day discipline streak",
        requirement: "30-day streak",
        tier: Tier::Gold,
        max_progress: 30,
    },
    Definition {
        id: "void_sovereign",
        name: "Void Sovereign",
        description: "Keep the discipline streak alive for 30 days",
        requirement: "30-day streak",
        tier: Tier::Legendary,
        max_progress: 30,
    },
    Definition {
        id: "perfect_month",
        name: "Perfect Month",
        description: "80%+ win rate with 50+ trades in a month",
        requirement: "80% win rate, 50 trades",
        tier: Tier::Legendary,
        max_progress: 100,
    },
    Definition {
        id: LEGEND_ID,
        name: "Samurai Legend",
        description: "Unlock all other achievements",
        requirement: "All achievements",
        tier: Tier::Legendary,
        max_progress: (CATALOG_LEN - 1) as u32,
    },
];

const CATALOG_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub requirement: String,
    pub tier: Tier,
    pub progress: u32,
    pub max_progress: u32,
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl Achievement {
    fn from_definition(def: &Definition) -> Self {
        Self {
            id: def.id.to_string(),
            name: def.name.to_string(),
            description: def.description.to_string(),
            requirement: def.requirement.to_string(),
            tier: def.tier,
            progress: 0,
            max_progress: def.max_progress,
            unlocked_at: None,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementBoard {
    pub streak: u32,
    pub unlocked: usize,
    pub total: usize,
    pub achievements: Vec<Achievement>,
}

/// Every achievement, locked with no progress
pub fn catalog() -> Vec<Achievement> {
    CATALOG.iter().map(Achievement::from_definition).collect()
}

/// Line saved progress up with the current catalog; unknown ids are dropped.
pub fn restore(saved: Vec<Achievement>) -> Vec<Achievement> {
    catalog()
        .into_iter()
        .map(|mut fresh| {
            if let Some(old) = saved.iter().find(|a| a.id == fresh.id) {
                fresh.progress = old.progress.min(fresh.max_progress);
                fresh.unlocked_at = old.unlocked_at;
            }
            fresh
        })
        .collect()
}

/// Consecutive UTC days, ending today (or yesterday while today has no trades yet),
/// on which every logged trade passed the checklist.
pub fn discipline_streak(trades: &[Trade], today: NaiveDate) -> u32 {
    let mut days: BTreeMap<NaiveDate, bool> = BTreeMap::new();
    for trade in trades {
        *days.entry(trade.timestamp.date_naive()).or_insert(true) &= trade.passed_checklist;
    }

    let start = if days.contains_key(&today) { Some(today) } else { today.pred_opt() };
    let mut streak = 0;
    let mut day = start;
    while let Some(d) = day {
        if days.get(&d) != Some(&true) {
            break;
        }
        streak += 1;
        day = d.pred_opt();
    }
    streak
}

/// Counters the progress of every achievement derives from
struct Tally {
    total: u32,
    today: u32,
    wins: u32,
    disciplined: u32,
    calm: u32,
    profit: u32,
    best_win_run: u32,
    streak: u32,
    month_total: u32,
    month_wins: u32,
}

fn clamp(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl Tally {
    fn new(trades: &[Trade], now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let month_start = now - Duration::days(30);
        let count = |pred: &dyn Fn(&Trade) -> bool| clamp(trades.iter().filter(|t| pred(t)).count());

        let profit = trades
            .iter()
            .map(|t| t.pnl)
            .filter(|p| *p > Decimal::ZERO)
            .fold(Decimal::ZERO, |acc, p| acc.checked_add(p).unwrap_or(Decimal::MAX));

        let mut best_win_run = 0;
        let mut run = 0;
        for trade in trades {
            if trade.outcome == TradeOutcome::Win {
                run += 1;
                best_win_run = best_win_run.max(run);
            } else {
                run = 0;
            }
        }

        Self {
            total: clamp(trades.len()),
            today: count(&|t: &Trade| t.timestamp.date_naive() == today),
            wins: count(&|t: &Trade| t.outcome == TradeOutcome::Win),
            disciplined: count(&|t: &Trade| t.passed_checklist),
            calm: count(&|t: &Trade| t.emotion == "Calm"),
            profit: profit.floor().to_u32().unwrap_or(u32::MAX),
            best_win_run,
            streak: discipline_streak(trades, today),
            month_total: count(&|t: &Trade| t.timestamp >= month_start),
            month_wins: count(&|t: &Trade| t.timestamp >= month_start && t.outcome == TradeOutcome::Win),
        }
    }

    fn progress(&self, id: &str) -> u32 {
        match id {
            "first_blood" | "century_warrior" => self.total,
            "triple_strike" => self.today,
            "first_victory" => self.wins,
            "discipline_initiate" | "discipline_master" => self.disciplined,
            "winning_streak_5" | "winning_streak_10" => self.best_win_run,
            "zen_master" => self.calm,
            "profit_hunter" | "profit_lord" => self.profit,
            "week_warrior" | "month_master" | "void_sovereign" => self.streak,
            "perfect_month" => {
                let sharp = self.month_total > 0 && self.month_wins * 100 >= self.month_total * 80;
                if sharp && self.month_total >= 50 {
                    100
                } else {
                    self.month_total.min(50) + if sharp { 50 } else { 0 }
                }
            }
            _ => 0,
        }
    }
}

/// Recompute progress against the whole log. Returns the updated list and the
/// achievements unlocked by this call; an unlock is never taken back.
pub fn evaluate(current: &[Achievement], trades: &[Trade], now: DateTime<Utc>) -> (Vec<Achievement>, Vec<Achievement>) {
    let tally = Tally::new(trades, now);
    let mut newly_unlocked = Vec::new();

    let mut updated: Vec<Achievement> = CATALOG
        .iter()
        .filter(|def| def.id != LEGEND_ID)
        .map(|def| {
            let mut achievement = Achievement::from_definition(def);
            achievement.progress = tally.progress(def.id).min(def.max_progress);
            achievement.unlocked_at = current.iter().find(|a| a.id == def.id).and_then(|a| a.unlocked_at);
            if achievement.unlocked_at.is_none() && achievement.progress >= def.max_progress {
                achievement.unlocked_at = Some(now);
                newly_unlocked.push(achievement.clone());
            }
            achievement
        })
        .collect();

    if let Some(def) = CATALOG.iter().find(|d| d.id == LEGEND_ID) {
        let mut legend = Achievement::from_definition(def);
        legend.progress = clamp(updated.iter().filter(|a| a.is_unlocked()).count()).min(def.max_progress);
        legend.unlocked_at = current.iter().find(|a| a.id == LEGEND_ID).and_then(|a| a.unlocked_at);
        if legend.unlocked_at.is_none() && legend.progress >= def.max_progress {
            legend.unlocked_at = Some(now);
            newly_unlocked.push(legend.clone());
        }
        updated.push(legend);
    }

    (updated, newly_unlocked)
}

impl Journal {
    /// Re-check achievements after the log changed. Caller holds the state lock.
    pub(crate) fn check_achievements(&self, state: &mut AppState, now: DateTime<Utc>) {
        let (updated, unlocked) = evaluate(&state.achievements, &state.trades, now);
        for achievement in &unlocked {
            info!("🏆 Achievement unlocked: {} ({})", achievement.name, achievement.description);
        }
        if updated != state.achievements {
            state.achievements = updated;
            self.persist(db::KEY_ACHIEVEMENTS, &state.achievements);
        }
    }

    pub fn achievements(&self, now: DateTime<Utc>) -> AchievementBoard {
        let state = self.state.lock();
        AchievementBoard {
            streak: discipline_streak(&state.trades, now.date_naive()),
            unlocked: state.achievements.iter().filter(|a| a.is_unlocked()).count(),
            total: state.achievements.len(),
            achievements: state.achievements.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::ManualTrade;
    use crate::models::TradeType;
    use crate::state::Rules;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    fn trade(outcome: TradeOutcome, pnl: i64, passed_checklist: bool, at: DateTime<Utc>) -> Trade {
        Trade {
            id: format!("t-{}-{}", at.timestamp_millis(), pnl),
            signature: None,
            token_name: "BONK".to_string(),
            token_mint: None,
            token_logo: None,
            trade_type: TradeType::Long,
            entry_price: Decimal::ONE,
            exit_price: Decimal::ONE,
            position_size: Decimal::ONE_HUNDRED,
            trade_reason: String::new(),
            outcome,
            emotion: "Confident".to_string(),
            timestamp: at,
            passed_checklist,
            pnl: Decimal::from(pnl),
            pnl_percent: Decimal::ZERO,
            is_from_chain: false,
            amount: None,
            current_price: None,
            log_completed: true,
        }
    }

    fn find<'a>(list: &'a [Achievement], id: &str) -> &'a Achievement {
        list.iter().find(|a| a.id == id).unwrap()
    }

    #[test]
    fn catalog_is_complete() {
        let all = catalog();
        assert_eq!(all.len(), CATALOG_LEN);
        assert_eq!(find(&all, LEGEND_ID).max_progress, 15);
        assert!(all.iter().all(|a| !a.is_unlocked() && a.progress == 0));
    }

    #[test]
    fn win_runs_unlock_and_stay_unlocked() {
        let mut trades: Vec<Trade> = (0..5).map(|i| trade(TradeOutcome::Win, 10 + i, false, now())).collect();
        let (list, unlocked) = evaluate(&catalog(), &trades, now());
        let ids: Vec<&str> = unlocked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["first_blood", "triple_strike", "first_victory", "winning_streak_5"]);
        assert_eq!(find(&list, "winning_streak_10").progress, 5);
        assert_eq!(find(&list, "profit_hunter").progress, 60);

        // a loss ends the run but the unlock keeps its original time
        trades.push(trade(TradeOutcome::Loss, -5, false, now()));
        let later = now() + Duration::hours(1);
        let (again, unlocked) = evaluate(&list, &trades, later);
        assert!(unlocked.is_empty());
        assert_eq!(find(&again, "winning_streak_5").unlocked_at, Some(now()));
        assert_eq!(find(&again, LEGEND_ID).progress, 4);
    }

    #[test]
    fn streak_counts_fully_disciplined_days() {
        let today = now().date_naive();
        let day = |n: i64| now() - Duration::days(n);
        let mut trades = vec![
            trade(TradeOutcome::Win, 1, true, day(4)),
            trade(TradeOutcome::Win, 1, false, day(3)),
            trade(TradeOutcome::Win, 1, true, day(2)),
            trade(TradeOutcome::Win, 1, true, day(1)),
            trade(TradeOutcome::Win, 1, true, day(1)),
        ];
        // nothing today yet: the run through yesterday still counts
        assert_eq!(discipline_streak(&trades, today), 2);

        trades.push(trade(TradeOutcome::Win, 1, true, day(0)));
        assert_eq!(discipline_streak(&trades, today), 3);

        trades.push(trade(TradeOutcome::Loss, -1, false, day(0)));
        assert_eq!(discipline_streak(&trades, today), 0);
        assert_eq!(discipline_streak(&[], today), 0);
    }

    #[test]
    fn perfect_month_only_looks_back_thirty_days() {
        let mut trades: Vec<Trade> = (0..10)
            .map(|i| trade(TradeOutcome::Win, 1, false, now() - Duration::days(i)))
            .collect();
        trades.push(trade(TradeOutcome::Loss, -1, false, now() - Duration::days(40)));

        let (list, _) = evaluate(&catalog(), &trades, now());
        assert_eq!(find(&list, "perfect_month").progress, 60);

        trades.push(trade(TradeOutcome::Loss, -1, false, now()));
        trades.push(trade(TradeOutcome::Loss, -1, false, now()));
        trades.push(trade(TradeOutcome::Loss, -1, false, now()));
        let (list, _) = evaluate(&catalog(), &trades, now());
        assert_eq!(find(&list, "perfect_month").progress, 13);
    }

    #[test]
    fn legend_needs_every_other_achievement() {
        let mut almost = catalog();
        for a in almost.iter_mut().filter(|a| a.id != LEGEND_ID && a.id != "profit_lord") {
            a.unlocked_at = Some(now());
        }
        let (list, unlocked) = evaluate(&almost, &[], now());
        assert!(unlocked.is_empty());
        assert_eq!(find(&list, LEGEND_ID).progress, 14);

        let (list, unlocked) = evaluate(&list, &[trade(TradeOutcome::Win, 10_000, false, now())], now());
        let ids: Vec<&str> = unlocked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["profit_lord", LEGEND_ID]);
        assert!(find(&list, LEGEND_ID).is_unlocked());
    }

    #[test]
    fn restore_follows_the_catalog() {
        let mut saved = catalog();
        saved[0].unlocked_at = Some(now());
        saved[0].progress = 1;
        saved.retain(|a| a.id != "zen_master");
        saved.push(Achievement {
            id: "retired".to_string(),
            ..saved[1].clone()
        });

        let restored = restore(saved);
        assert_eq!(restored.len(), CATALOG_LEN);
        assert_eq!(restored[0].unlocked_at, Some(now()));
        assert!(!find(&restored, "zen_master").is_unlocked());
        assert!(restored.iter().all(|a| a.id != "retired"));
    }

    #[test]
    fn journal_unlocks_on_manual_trades_and_clear_resets() {
        let journal = Journal::in_memory(Rules::default());
        let at = Utc::now();
        journal
            .add_manual_trade(
                ManualTrade {
                    token_name: "wif".to_string(),
                    trade_type: TradeType::Long,
                    entry_price: Decimal::from(2),
                    exit_price: Decimal::from(3),
                    position_size: Decimal::from(100),
                    trade_reason: String::new(),
                    emotion: "Calm".to_string(),
                    passed_checklist: true,
                },
                at,
            )
            .unwrap();

        let board = journal.achievements(at);
        assert_eq!(board.unlocked, 3);
        assert_eq!(board.total, CATALOG_LEN);
        assert_eq!(board.streak, 1);
        assert!(find(&board.achievements, "discipline_initiate").is_unlocked());
        assert_eq!(find(&board.achievements, "zen_master").progress, 1);

        journal.clear_data();
        let board = journal.achievements(at);
        assert_eq!(board.unlocked, 0);
        assert_eq!(board.total, CATALOG_LEN);
        assert_eq!(board.streak, 0);
    }

    #[test]
    fn unlocks_survive_a_restart() {
        let dir = std::env::temp_dir().join(format!("journal-achievements-{}.db", std::process::id()));
        let path = dir.to_string_lossy().to_string();
        let _ = std::fs::remove_file(&path);
        let at = Utc::now();

        {
            let journal = Journal::open(db::connect(&path).unwrap(), Rules::default(), at).unwrap();
            let mut state = journal.state.lock();
            state.trades.push(trade(TradeOutcome::Win, 5, true, at));
            journal.check_achievements(&mut state, at);
        }

        let journal = Journal::open(db::connect(&path).unwrap(), Rules::default(), at).unwrap();
        let board = journal.achievements(at);
        assert!(find(&board.achievements, "first_victory").is_unlocked());
        assert_eq!(find(&board.achievements, "first_victory").unlocked_at, Some(at));

        drop(journal);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path}{suffix}"));
        }
    }
}
