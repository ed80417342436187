// Scripted stand-in for the indexing service, shared by the unit tests.
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::IndexerError;
use crate::models::WalletHolding;
use crate::rpc::{Indexer, RawTransaction, TokenMetadata};

pub const WALLET: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

#[derive(Default)]
pub struct FakeIndexer {
    /// One entry per `fetch_transactions` call; `None` scripts a failure.
    /// When the script runs dry the last batch is served again.
    pub batches: Mutex<VecDeque<Option<Vec<RawTransaction>>>>,
    last_batch: Mutex<Vec<RawTransaction>>,
    pub metadata: Mutex<HashMap<String, TokenMetadata>>,
    pub documents: Mutex<HashMap<String, Value>>,
    pub holdings: Mutex<Option<Vec<WalletHolding>>>,
    pub sol_price: Mutex<Option<Decimal>>,
    pub fetch_calls: AtomicUsize,
    pub metadata_calls: AtomicUsize,
    pub holdings_calls: AtomicUsize,
}

impl FakeIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, batch: Vec<RawTransaction>) {
        self.batches.lock().push_back(Some(batch));
    }

    pub fn push_failure(&self) {
        self.batches.lock().push_back(None);
    }

    pub fn with_token(self, mint: &str, symbol: &str, logo: &str) -> Self {
        self.metadata.lock().insert(
            mint.to_string(),
            TokenMetadata {
                symbol: symbol.to_string(),
                name: format!("{symbol} Token"),
                logo: logo.to_string(),
                decimals: 6,
            },
        );
        self
    }

    pub fn with_sol_price(self, price: Decimal) -> Self {
        *self.sol_price.lock() = Some(price);
        self
    }
}

#[async_trait]
impl Indexer for FakeIndexer {
    async fn fetch_transactions(
        &self,
        _address: &str,
        _before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawTransaction>, IndexerError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.batches.lock().pop_front();
        let batch = match next {
            Some(Some(batch)) => {
                *self.last_batch.lock() = batch.clone();
                batch
            }
            Some(None) => return Err(IndexerError::Status(StatusCode::BAD_GATEWAY)),
            None => self.last_batch.lock().clone(),
        };
        Ok(batch.into_iter().take(limit).collect())
    }

    async fn token_metadata(&self, mints: &[String]) -> Result<Vec<TokenMetadata>, IndexerError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let known = self.metadata.lock();
        Ok(mints.iter().filter_map(|m| known.get(m).cloned()).collect())
    }

    async fn assets_by_owner(&self, _owner: &str) -> Result<Vec<WalletHolding>, IndexerError> {
        self.holdings_calls.fetch_add(1, Ordering::SeqCst);
        match self.holdings.lock().clone() {
            Some(holdings) => Ok(holdings),
            None => Err(IndexerError::Status(StatusCode::SERVICE_UNAVAILABLE)),
        }
    }

    async fn token_price(&self, _mint: &str) -> Result<Option<Decimal>, IndexerError> {
        Ok(*self.sol_price.lock())
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, IndexerError> {
        self.documents
            .lock()
            .get(url)
            .cloned()
            .ok_or(IndexerError::Status(StatusCode::NOT_FOUND))
    }
}

pub fn raw(value: Value) -> RawTransaction {
    serde_json::from_value(value).expect("fixture must match the wire shape")
}

/// A transaction that moves nothing the classifier cares about.
pub fn plain_tx(signature: &str, timestamp: i64) -> RawTransaction {
    raw(json!({
        "signature": signature,
        "timestamp": timestamp,
        "type": "TRANSFER",
        "source": "SYSTEM_PROGRAM",
        "tokenTransfers": [],
        "nativeTransfers": []
    }))
}

/// Wallet spends `lamports` of SOL and receives `tokens` of `mint` through a swap event.
pub fn buy_tx(signature: &str, timestamp: i64, mint: &str, lamports: u64, tokens: f64) -> RawTransaction {
    raw(json!({
        "signature": signature,
        "timestamp": timestamp,
        "type": "SWAP",
        "source": "JUPITER",
        "tokenTransfers": [
            { "fromUserAccount": "Pool", "toUserAccount": WALLET, "mint": mint, "tokenAmount": tokens }
        ],
        "nativeTransfers": [
            { "fromUserAccount": WALLET, "toUserAccount": "Pool", "amount": lamports }
        ]
    }))
}
