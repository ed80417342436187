use futures_util::future::join;
use moka::future::Cache;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{DetectedTrade, TokenInfo, TradeSide, SOL_MINT};
use crate::parser::SwapLegs;
use crate::rpc::{Indexer, RawTransaction};

/// Symbols treated as dollars when valuing a trade
pub const STABLECOINS: &[&str] = &["USDC", "USDT", "USDH", "DAI", "BUSD", "UST"];

/// Hosts whose "logo" is really an off-chain metadata JSON document
const METADATA_HOSTS: &[&str] = &["arweave", "ipfs"];

/// Tokens that never need a metadata lookup
pub fn known_token(mint: &str) -> Option<TokenInfo> {
    let (symbol, name, logo, decimals) = match mint {
        SOL_MINT => (
            "SOL",
            "Solana",
            "https://raw.githubusercontent.com/solana-labs/token-list/main/assets/mainnet/So11111111111111111111111111111111111111112/logo.png",
            9,
        ),
        "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v" => (
            "USDC",
            "USD Coin",
            "https://raw.githubusercontent.com/solana-labs/token-list/main/assets/mainnet/EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v/logo.png",
            6,
        ),
        "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB" => (
            "USDT",
            "Tether USD",
            "https://raw.githubusercontent.com/solana-labs/token-list/main/assets/mainnet/Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB/logo.svg",
            6,
        ),
        _ => return None,
    };

    Some(TokenInfo {
        mint: mint.to_string(),
        symbol: symbol.to_string(),
        name: name.to_string(),
        logo: logo.to_string(),
        decimals,
    })
}

pub fn is_cash_like(symbol: &str) -> bool {
    symbol == "SOL" || STABLECOINS.contains(&symbol)
}

fn placeholder_logo(symbol: &str) -> String {
    format!("https://ui-avatars.com/api/?name={symbol}&background=random")
}

/// Turns classified swap legs into a priced `DetectedTrade`.
pub struct TradeBuilder {
    indexer: Arc<dyn Indexer>,
    tokens: Cache<String, TokenInfo>,
}

impl TradeBuilder {
    pub fn new(indexer: Arc<dyn Indexer>) -> Self {
        Self {
            indexer,
            tokens: Cache::builder().max_capacity(4096).build(),
        }
    }

    /// Known table, then the session cache, then the metadata service.
    /// Misses are not cached so a later poll can still resolve the mint.
    pub async fn resolve_token(&self, mint: &str) -> Option<TokenInfo> {
        if let Some(info) = known_token(mint) {
            return Some(info);
        }
        if let Some(info) = self.tokens.get(mint).await {
            return Some(info);
        }

        let fetched = match self.indexer.token_metadata(&[mint.to_string()]).await {
            Ok(list) => list.into_iter().next(),
            Err(e) => {
                warn!("Token metadata lookup failed for {}: {}", mint, e);
                None
            }
        };

        let info = fetched.map(|meta| TokenInfo {
            mint: mint.to_string(),
            symbol: meta.symbol,
            name: meta.name,
            logo: meta.logo,
            decimals: meta.decimals,
        })?;

        self.tokens.insert(mint.to_string(), info.clone()).await;
        Some(info)
    }

    async fn sol_price(&self) -> Option<Decimal> {
        match self.indexer.token_price(SOL_MINT).await {
            Ok(price) => price,
            Err(e) => {
                warn!("SOL price lookup failed: {}", e);
                None
            }
        }
    }

    /// Follow metadata-document logos to their `image` field; any failure keeps the original.
    async fn resolve_logo(&self, logo: &str) -> String {
        if !METADATA_HOSTS.iter().any(|host| logo.contains(host)) {
            return logo.to_string();
        }

        match self.indexer.fetch_json(logo).await {
            Ok(doc) => doc
                .get("image")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| logo.to_string()),
            Err(e) => {
                debug!("Logo document {} unavailable: {}", logo, e);
                logo.to_string()
            }
        }
    }

    /// Price a classified swap. Returns `None` when either leg's token cannot be resolved.
    pub async fn build(&self, tx: &RawTransaction, legs: &SwapLegs) -> Option<DetectedTrade> {
        let (in_info, out_info) = join(
            self.resolve_token(&legs.token_in.mint),
            self.resolve_token(&legs.token_out.mint),
        )
        .await;

        let (Some(in_info), Some(out_info)) = (in_info, out_info) else {
            warn!("{}: missing token metadata, dropping trade", tx.signature);
            return None;
        };

        let in_is_cash = is_cash_like(&in_info.symbol);
        let out_is_cash = is_cash_like(&out_info.symbol);

        // both-cash and neither-cash swaps are ambiguous; they read as a buy of the output
        let (side, traded, traded_amount, cash, cash_amount) = if out_is_cash && !in_is_cash {
            (TradeSide::Sell, in_info, legs.token_in.amount, out_info, legs.token_out.amount)
        } else {
            (TradeSide::Buy, out_info, legs.token_out.amount, in_info, legs.token_in.amount)
        };

        let total_value = if cash.symbol == "SOL" {
            match self.sol_price().await {
                Some(price) => match cash_amount.checked_mul(price) {
                    Some(value) => value,
                    None => {
                        warn!("{}: {} SOL at ${} overflows, dropping trade", tx.signature, cash_amount, price);
                        return None;
                    }
                },
                None => cash_amount,
            }
        } else {
            cash_amount
        };

        let price_per_token = total_value.checked_div(traded_amount).unwrap_or(Decimal::ZERO);

        let logo = if traded.logo.is_empty() {
            placeholder_logo(&traded.symbol)
        } else {
            self.resolve_logo(&traded.logo).await
        };

        Some(DetectedTrade {
            signature: tx.signature.clone(),
            side,
            token_mint: traded.mint,
            token_symbol: traded.symbol,
            token_name: traded.name,
            token_logo: logo,
            amount: traded_amount,
            price_per_token,
            total_value,
            timestamp: tx.timestamp * 1000,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenLeg;
    use crate::testing::{plain_tx, FakeIndexer};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn legs(in_mint: &str, in_amount: Decimal, out_mint: &str, out_amount: Decimal) -> SwapLegs {
        SwapLegs {
            token_in: TokenLeg { mint: in_mint.to_string(), amount: in_amount },
            token_out: TokenLeg { mint: out_mint.to_string(), amount: out_amount },
        }
    }

    fn builder(fake: FakeIndexer) -> (Arc<FakeIndexer>, TradeBuilder) {
        let fake = Arc::new(fake);
        let builder = TradeBuilder::new(fake.clone());
        (fake, builder)
    }

    #[tokio::test]
    async fn sol_for_token_is_a_buy_valued_at_the_sol_price() {
        let (_, builder) = builder(
            FakeIndexer::new()
                .with_token("TOKX", "TOKX", "https://img/tokx.png")
                .with_sol_price(Decimal::new(150, 0)),
        );

        let tx = plain_tx("sig-buy", 1_700_000_000);
        let trade = builder
            .build(&tx, &legs(SOL_MINT, Decimal::ONE, "TOKX", Decimal::new(5, 0)))
            .await
            .unwrap();

        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.token_mint, "TOKX");
        assert_eq!(trade.amount, Decimal::new(5, 0));
        assert_eq!(trade.total_value, Decimal::new(150, 0));
        assert_eq!(trade.price_per_token, Decimal::new(30, 0));
        assert_eq!(trade.token_logo, "https://img/tokx.png");
        assert_eq!(trade.timestamp, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn token_for_stablecoin_is_a_sell_in_dollars() {
        let (_, builder) = builder(FakeIndexer::new().with_token("TOKX", "TOKX", ""));

        let tx = plain_tx("sig-sell", 10);
        let trade = builder
            .build(&tx, &legs("TOKX", Decimal::new(4, 0), USDC, Decimal::new(10, 0)))
            .await
            .unwrap();

        assert_eq!(trade.side, TradeSide::Sell);
        assert_eq!(trade.token_symbol, "TOKX");
        assert_eq!(trade.total_value, Decimal::new(10, 0));
        assert_eq!(trade.price_per_token, Decimal::new(25, 1));
        assert_eq!(trade.token_logo, "https://ui-avatars.com/api/?name=TOKX&background=random");
    }

    #[tokio::test]
    async fn ambiguous_pairs_default_to_buying_the_output() {
        let (_, builder) = builder(
            FakeIndexer::new()
                .with_token("AAA", "AAA", "")
                .with_token("BBB", "BBB", ""),
        );

        let tx = plain_tx("sig-amb", 10);
        let trade = builder
            .build(&tx, &legs("AAA", Decimal::new(3, 0), "BBB", Decimal::new(6, 0)))
            .await
            .unwrap();
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.token_mint, "BBB");
        assert_eq!(trade.total_value, Decimal::new(3, 0));

        let trade = builder
            .build(&tx, &legs(USDC, Decimal::new(20, 0), SOL_MINT, Decimal::new(1, 1)))
            .await
            .unwrap();
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.token_symbol, "SOL");
        assert_eq!(trade.price_per_token, Decimal::new(200, 0));
    }

    #[tokio::test]
    async fn missing_metadata_drops_the_trade() {
        let (_, builder) = builder(FakeIndexer::new());
        let tx = plain_tx("sig-unknown", 10);
        assert!(builder
            .build(&tx, &legs(SOL_MINT, Decimal::ONE, "NOPE", Decimal::ONE))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn zero_traded_amount_prices_at_zero() {
        let (_, builder) = builder(FakeIndexer::new().with_token("TOKX", "TOKX", ""));
        let tx = plain_tx("sig-zero", 10);
        let trade = builder
            .build(&tx, &legs(USDC, Decimal::new(10, 0), "TOKX", Decimal::ZERO))
            .await
            .unwrap();
        assert_eq!(trade.price_per_token, Decimal::ZERO);
    }

    #[tokio::test]
    async fn missing_sol_price_keeps_the_raw_cash_amount() {
        let (_, builder) = builder(FakeIndexer::new().with_token("TOKX", "TOKX", ""));
        let tx = plain_tx("sig-noprice", 10);
        let trade = builder
            .build(&tx, &legs(SOL_MINT, Decimal::new(2, 0), "TOKX", Decimal::new(4, 0)))
            .await
            .unwrap();
        assert_eq!(trade.total_value, Decimal::new(2, 0));
    }

    #[tokio::test]
    async fn overflowing_valuation_drops_the_trade() {
        // a mint whose metadata claims to be SOL is valued at the SOL price
        let (_, builder) = builder(
            FakeIndexer::new()
                .with_token("FAKESOL", "SOL", "")
                .with_token("TOKX", "TOKX", "")
                .with_sol_price(Decimal::new(150, 0)),
        );
        let tx = plain_tx("sig-huge", 10);
        let huge = Decimal::from_i128_with_scale(79_000_000_000_000_000_000_000_000_000, 1);

        assert!(builder
            .build(&tx, &legs("FAKESOL", huge, "TOKX", Decimal::ONE))
            .await
            .is_none());

        // the builder is still usable afterwards
        assert!(builder
            .build(&tx, &legs("FAKESOL", Decimal::ONE, "TOKX", Decimal::ONE))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn metadata_document_logos_are_followed_once() {
        let doc_url = "https://arweave.net/meta.json";
        let fake = FakeIndexer::new()
            .with_token("TOKX", "TOKX", doc_url)
            .with_token("TOKY", "TOKY", "https://ipfs.io/ipfs/missing");
        fake.documents
            .lock()
            .insert(doc_url.to_string(), json!({ "image": "https://arweave.net/logo.png" }));
        let (_, builder) = builder(fake);

        let tx = plain_tx("sig-logo", 10);
        let trade = builder
            .build(&tx, &legs(USDC, Decimal::ONE, "TOKX", Decimal::ONE))
            .await
            .unwrap();
        assert_eq!(trade.token_logo, "https://arweave.net/logo.png");

        let trade = builder
            .build(&tx, &legs(USDC, Decimal::ONE, "TOKY", Decimal::ONE))
            .await
            .unwrap();
        assert_eq!(trade.token_logo, "https://ipfs.io/ipfs/missing");
    }

    #[tokio::test]
    async fn resolved_tokens_are_cached_by_mint() {
        let (fake, builder) = builder(FakeIndexer::new().with_token("TOKX", "TOKX", ""));

        assert!(builder.resolve_token("TOKX").await.is_some());
        assert!(builder.resolve_token("TOKX").await.is_some());
        assert_eq!(fake.metadata_calls.load(Ordering::SeqCst), 1);

        // known tokens never reach the service
        assert_eq!(builder.resolve_token(SOL_MINT).await.unwrap().symbol, "SOL");
        assert_eq!(fake.metadata_calls.load(Ordering::SeqCst), 1);

        // misses are retried
        assert!(builder.resolve_token("NOPE").await.is_none());
        assert!(builder.resolve_token("NOPE").await.is_none());
        assert_eq!(fake.metadata_calls.load(Ordering::SeqCst), 3);
    }
}
