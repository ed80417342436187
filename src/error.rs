use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the indexing service and its neighbours (metadata, price).
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("indexer returned HTTP {0}")]
    Status(StatusCode),

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum JournalError {
    #[error("no trade is waiting to be logged")]
    NothingPending,

    #[error("cooldown active until {0}")]
    CooldownActive(DateTime<Utc>),

    #[error("logging window for {0} has closed")]
    DeadlinePassed(String),

    #[error("an emotion must be selected")]
    MissingEmotion,

    #[error("invalid Solana wallet address: {0}")]
    InvalidAddress(String),

    #[error("invalid trade: {0}")]
    InvalidTrade(&'static str),
}
