use eyre::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::Trade;

pub const KEY_LAST_SIGNATURE: &str = "lastPolledSignature";
pub const KEY_PENDING: &str = "pendingTrades";
pub const KEY_ESCALATION: &str = "escalatingCooldown";
pub const KEY_COOLDOWN: &str = "cooldown";
pub const KEY_WALLET: &str = "trackedWallet";
pub const KEY_LOSSES: &str = "consecutiveLosses";
pub const KEY_ACHIEVEMENTS: &str = "achievements";

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS app_state (
  key        TEXT PRIMARY KEY,
  value      TEXT NOT NULL, -- JSON document
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS trades (
  seq        INTEGER PRIMARY KEY AUTOINCREMENT,
  id         TEXT NOT NULL UNIQUE,
  signature  TEXT UNIQUE,            -- NULL for manual entries
  body       TEXT NOT NULL,          -- JSON Trade
  logged_at  TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Connect to SQLite (with WAL mode for performance)
pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INIT_SQL)?;
    Ok(())
}

/// Insert or replace one JSON state entry
pub fn put_value<T: Serialize + ?Sized>(conn: &Connection, key: &str, value: &T) -> Result<()> {
    let body = serde_json::to_string(value)?;
    conn.execute(
        r#"
        INSERT INTO app_state (key, value, updated_at)
        VALUES (?1, ?2, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET
            value      = excluded.value,
            updated_at = excluded.updated_at
        "#,
        params![key, body],
    )?;
    Ok(())
}

pub fn get_value<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>> {
    let body: Option<String> = conn
        .query_row("SELECT value FROM app_state WHERE key = ?1", [key], |r| r.get(0))
        .optional()?;

    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

pub fn delete_value(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM app_state WHERE key = ?1", [key])?;
    Ok(())
}

/// Append to the permanent log; a trade whose id or signature is already logged is ignored
pub fn insert_trade(conn: &Connection, trade: &Trade) -> Result<bool> {
    let body = serde_json::to_string(trade)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO trades (id, signature, body) VALUES (?1, ?2, ?3)",
        params![trade.id, trade.signature, body],
    )?;
    Ok(inserted == 1)
}

/// All trades in the order they were logged
pub fn load_trades(conn: &Connection) -> Result<Vec<Trade>> {
    let mut stmt = conn.prepare("SELECT body FROM trades ORDER BY seq ASC")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;

    let mut trades = Vec::new();
    for body in rows {
        trades.push(serde_json::from_str(&body?)?);
    }
    Ok(trades)
}

/// Full data clear
pub fn clear_all(conn: &Connection) -> Result<()> {
    conn.execute_batch("DELETE FROM trades; DELETE FROM app_state;")?;
    Ok(())
}
