// src/rpc.rs
use async_trait::async_trait;
use reqwest::{Client, Response};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::IndexerError;
use crate::models::{WalletHolding, SOL_MINT};

pub const LAMPORTS_DECIMALS: u32 = 9;

/// `null` and missing both decode to the type's default (the indexer sends either).
fn nullable<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

// ---------- indexer wire types ----------

/// One enriched transaction as returned by the address-transactions endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub signature: String,
    #[serde(default)]
    pub timestamp: i64, // unix seconds
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub category: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source: String,
    #[serde(default, deserialize_with = "nullable")]
    pub token_transfers: Vec<TokenTransfer>,
    #[serde(default, deserialize_with = "nullable")]
    pub native_transfers: Vec<NativeTransfer>,
    #[serde(default, deserialize_with = "nullable")]
    pub events: TransactionEvents,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    pub mint: String,
    #[serde(default)]
    pub token_amount: f64, // already scaled by decimals
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTransfer {
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    #[serde(default)]
    pub amount: u64, // lamports
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionEvents {
    #[serde(default)]
    pub swap: Option<SwapEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapEvent {
    #[serde(default)]
    pub native_input: Option<NativeAmount>,
    #[serde(default)]
    pub native_output: Option<NativeAmount>,
    #[serde(default, deserialize_with = "nullable")]
    pub token_inputs: Vec<SwapTokenAmount>,
    #[serde(default, deserialize_with = "nullable")]
    pub token_outputs: Vec<SwapTokenAmount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeAmount {
    pub amount: String, // lamports as a decimal string
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTokenAmount {
    pub mint: String,
    pub raw_token_amount: RawTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenAmount {
    pub token_amount: String,
    pub decimals: u32,
}

/// Metadata fields the builder needs, already flattened from the indexer's shape
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub logo: String,
    pub decimals: u8,
}

// ---------- the service boundary ----------

/// Everything the pipeline asks of the outside world.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Most recent transactions for `address`, newest first.
    async fn fetch_transactions(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawTransaction>, IndexerError>;

    async fn token_metadata(&self, mints: &[String]) -> Result<Vec<TokenMetadata>, IndexerError>;

    async fn assets_by_owner(&self, owner: &str) -> Result<Vec<WalletHolding>, IndexerError>;

    /// Spot USD price, `None` when the price service does not know the mint.
    async fn token_price(&self, mint: &str) -> Result<Option<Decimal>, IndexerError>;

    /// Arbitrary JSON document (off-chain token metadata).
    async fn fetch_json(&self, url: &str) -> Result<Value, IndexerError>;
}

// ---------- Helius implementation ----------

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeliusTokenMetadata {
    #[serde(default)]
    on_chain_metadata: Option<OnChainMetadata>,
    #[serde(default)]
    legacy_metadata: Option<LegacyMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct OnChainMetadata {
    #[serde(default)]
    metadata: Option<MetadataFields>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataFields {
    #[serde(default)]
    data: Option<MetadataData>,
    // some responses flatten the data block
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataData {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMetadata {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "logoURI", default)]
    logo_uri: Option<String>,
    #[serde(default)]
    decimals: Option<u8>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim_matches(char::from(0)).trim().to_string())
        .filter(|s| !s.is_empty())
}

impl From<HeliusTokenMetadata> for TokenMetadata {
    fn from(raw: HeliusTokenMetadata) -> Self {
        let fields = raw.on_chain_metadata.and_then(|m| m.metadata).unwrap_or_default();
        let data = fields.data.unwrap_or_default();
        let legacy = raw.legacy_metadata.unwrap_or_default();

        TokenMetadata {
            symbol: non_empty(data.symbol)
                .or(non_empty(fields.symbol))
                .or(non_empty(legacy.symbol))
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            name: non_empty(data.name)
                .or(non_empty(fields.name))
                .or(non_empty(legacy.name))
                .unwrap_or_else(|| "Unknown Token".to_string()),
            logo: non_empty(data.uri)
                .or(non_empty(fields.uri))
                .or(non_empty(legacy.logo_uri))
                .unwrap_or_default(),
            decimals: legacy.decimals.unwrap_or(9),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetPage {
    #[serde(default)]
    items: Vec<Asset>,
    #[serde(default)]
    native_balance: Option<NativeBalance>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    id: String,
    #[serde(default)]
    interface: String,
    #[serde(default)]
    content: Option<AssetContent>,
    #[serde(default)]
    token_info: Option<AssetTokenInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetContent {
    #[serde(default)]
    metadata: Option<MetadataData>,
    #[serde(default)]
    links: Option<AssetLinks>,
    #[serde(default)]
    files: Vec<AssetFile>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetLinks {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetFile {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetTokenInfo {
    #[serde(default)]
    balance: Option<u64>,
    #[serde(default)]
    decimals: Option<u32>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    price_info: Option<PriceInfo>,
}

#[derive(Debug, Deserialize)]
struct PriceInfo {
    #[serde(default)]
    price_per_token: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NativeBalance {
    #[serde(default)]
    lamports: u64,
    #[serde(default)]
    price_per_sol: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    data: HashMap<String, Option<PriceEntry>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(default)]
    price: Option<f64>,
}

fn price_of(value: Option<f64>) -> Decimal {
    value.and_then(Decimal::from_f64).unwrap_or_default()
}

impl Asset {
    fn into_holding(self) -> Option<WalletHolding> {
        if self.interface != "FungibleToken" && self.interface != "FungibleAsset" {
            return None;
        }
        let info = self.token_info.unwrap_or_default();
        let decimals = info.decimals.unwrap_or(9).min(28);
        let amount = Decimal::from_i128_with_scale(info.balance.unwrap_or(0) as i128, decimals);
        if amount <= Decimal::ZERO {
            return None;
        }

        let content = self.content.unwrap_or_default();
        let metadata = content.metadata.unwrap_or_default();
        let logo = content
            .links
            .and_then(|l| non_empty(l.image))
            .or_else(|| content.files.into_iter().find_map(|f| non_empty(f.uri)))
            .unwrap_or_default();

        Some(WalletHolding {
            mint: self.id,
            symbol: non_empty(info.symbol)
                .or(non_empty(metadata.symbol))
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            name: non_empty(metadata.name).unwrap_or_else(|| "Unknown Token".to_string()),
            logo,
            amount,
            current_price: price_of(info.price_info.and_then(|p| p.price_per_token)),
        })
    }
}

/// Client for the Helius REST + DAS endpoints and the spot price API
#[derive(Clone)]
pub struct HeliusClient {
    http: Client,
    api_url: String,
    rpc_url: String,
    price_url: String,
    api_key: String,
}

impl HeliusClient {
    pub fn new(api_url: &str, rpc_url: &str, price_url: &str, api_key: &str) -> eyre::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            rpc_url: rpc_url.to_string(),
            price_url: price_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, IndexerError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(IndexerError::Status(status));
        }
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl Indexer for HeliusClient {
    async fn fetch_transactions(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawTransaction>, IndexerError> {
        let url = format!("{}/addresses/{}/transactions", self.api_url, address);
        let limit = limit.to_string();
        let mut query = vec![("api-key", self.api_key.as_str()), ("limit", limit.as_str())];
        if let Some(sig) = before {
            query.push(("before", sig));
        }

        debug!("📡 Fetching transactions for {} (limit {})", address, limit);
        let resp = self.http.get(&url).query(&query).send().await?;
        let txs: Vec<RawTransaction> = Self::decode(resp).await?;
        debug!("📩 Indexer returned {} transactions", txs.len());
        Ok(txs)
    }

    async fn token_metadata(&self, mints: &[String]) -> Result<Vec<TokenMetadata>, IndexerError> {
        let url = format!("{}/token-metadata", self.api_url);
        let resp = self
            .http
            .post(&url)
            .query(&[("api-key", self.api_key.as_str())])
            .json(&json!({ "mintAccounts": mints }))
            .send()
            .await?;

        let raw: Vec<Option<HeliusTokenMetadata>> = Self::decode(resp).await?;
        Ok(raw.into_iter().flatten().map(TokenMetadata::from).collect())
    }

    async fn assets_by_owner(&self, owner: &str) -> Result<Vec<WalletHolding>, IndexerError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "holdings",
            "method": "getAssetsByOwner",
            "params": {
                "ownerAddress": owner,
                "page": 1,
                "limit": 100,
                "displayOptions": {
                    "showFungible": true,
                    "showNativeBalance": true
                }
            }
        });

        let resp = self
            .http
            .post(&self.rpc_url)
            .query(&[("api-key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;
        let parsed: RpcResponse<AssetPage> = Self::decode(resp).await?;
        let page = parsed.result;

        let mut holdings: Vec<WalletHolding> =
            page.items.into_iter().filter_map(Asset::into_holding).collect();

        if let Some(native) = page.native_balance.filter(|n| n.lamports > 0) {
            holdings.insert(
                0,
                WalletHolding {
                    mint: SOL_MINT.to_string(),
                    symbol: "SOL".to_string(),
                    name: "Solana".to_string(),
                    logo: crate::builder::known_token(SOL_MINT)
                        .map(|t| t.logo)
                        .unwrap_or_default(),
                    amount: Decimal::from_i128_with_scale(native.lamports as i128, LAMPORTS_DECIMALS),
                    current_price: price_of(native.price_per_sol),
                },
            );
        }

        info!("Fetched {} holdings for {}", holdings.len(), owner);
        Ok(holdings)
    }

    async fn token_price(&self, mint: &str) -> Result<Option<Decimal>, IndexerError> {
        let resp = self.http.get(&self.price_url).query(&[("ids", mint)]).send().await?;
        let parsed: PriceResponse = Self::decode(resp).await?;
        Ok(parsed
            .data
            .get(mint)
            .and_then(|entry| entry.as_ref())
            .and_then(|entry| entry.price)
            .and_then(Decimal::from_f64))
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, IndexerError> {
        let resp = self.http.get(url).send().await?;
        Self::decode(resp).await
    }
}
