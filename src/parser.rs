// src/parser.rs
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{TokenLeg, SOL_MINT};
use crate::rpc::{NativeAmount, NativeTransfer, RawTransaction, SwapEvent, SwapTokenAmount, TokenTransfer, LAMPORTS_DECIMALS};

/// Native movements at or below this many lamports (0.00001 SOL) are fee noise.
pub const DUST_LAMPORTS: u64 = 10_000;

/// Transaction types the indexer uses for swap-like activity
const SWAP_TYPES: &[&str] = &["SWAP", "TOKEN_MINT", "BURN", "COMPRESSED_NFT_MINT"];

/// Programs whose transactions are worth reconstructing even without a swap event
const SWAP_SOURCES: &[&str] = &[
    "JUPITER", "RAYDIUM", "ORCA", "METEORA", "PUMP_FUN", "PHOENIX", "LIFINITY", "MARINADE", "WHIRLPOOL",
];

/// The resolved input (what the wallet gave up) and output (what it received)
#[derive(Debug, Clone, PartialEq)]
pub struct SwapLegs {
    pub token_in: TokenLeg,
    pub token_out: TokenLeg,
}

fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from_i128_with_scale(lamports as i128, LAMPORTS_DECIMALS)
}

fn sol_leg(lamports: u64) -> TokenLeg {
    TokenLeg {
        mint: SOL_MINT.to_string(),
        amount: lamports_to_sol(lamports),
    }
}

/// `None` when the indexer's float amount has no decimal representation (NaN, out of range).
fn transfer_leg(transfer: &TokenTransfer) -> Option<TokenLeg> {
    Some(TokenLeg {
        mint: transfer.mint.clone(),
        amount: Decimal::from_f64(transfer.token_amount)?,
    })
}

fn lamports_total<'a>(transfers: impl Iterator<Item = &'a NativeTransfer>) -> u64 {
    transfers.fold(0u64, |total, t| total.saturating_add(t.amount))
}

fn raw_token_leg(entry: &SwapTokenAmount) -> Option<TokenLeg> {
    let raw: i128 = entry.raw_token_amount.token_amount.trim().parse().ok()?;
    let amount = Decimal::try_from_i128_with_scale(raw, entry.raw_token_amount.decimals).ok()?;
    Some(TokenLeg {
        mint: entry.mint.clone(),
        amount,
    })
}

fn native_leg(native: &NativeAmount) -> Option<TokenLeg> {
    native.amount.trim().parse::<u64>().ok().map(sol_leg)
}

/// Decode one side of a swap event: first token entry wins, native amount is the fallback.
fn event_leg(tokens: &[SwapTokenAmount], native: Option<&NativeAmount>) -> Option<TokenLeg> {
    match tokens.first() {
        Some(entry) => raw_token_leg(entry),
        None => native.and_then(native_leg),
    }
}

fn from_swap_event(swap: &SwapEvent) -> Option<SwapLegs> {
    let token_in = event_leg(&swap.token_inputs, swap.native_input.as_ref())?;
    let token_out = event_leg(&swap.token_outputs, swap.native_output.as_ref())?;
    Some(SwapLegs { token_in, token_out })
}

fn is_swap_like(tx: &RawTransaction) -> bool {
    SWAP_TYPES.contains(&tx.category.as_str()) || SWAP_SOURCES.contains(&tx.source.as_str())
}

/// Last resort for known swap programs: net SOL flow (in minus out, self transfers
/// included on both sides) decides the direction.
fn reconstruct_from_net_sol(tx: &RawTransaction, wallet: &str) -> Option<SwapLegs> {
    if tx.token_transfers.is_empty() || tx.native_transfers.is_empty() {
        return None;
    }

    let sol_in: i128 = tx
        .native_transfers
        .iter()
        .filter(|t| t.to_user_account.as_deref() == Some(wallet))
        .map(|t| t.amount as i128)
        .sum();
    let sol_out: i128 = tx
        .native_transfers
        .iter()
        .filter(|t| t.from_user_account.as_deref() == Some(wallet))
        .map(|t| t.amount as i128)
        .sum();
    let net = sol_in - sol_out;
    let dust = DUST_LAMPORTS as i128;

    let received = tx.token_transfers.iter().find(|t| t.to_user_account.as_deref() == Some(wallet));
    let sent = tx.token_transfers.iter().find(|t| t.from_user_account.as_deref() == Some(wallet));

    if let Some(first_received) = received.filter(|_| net < -dust) {
        debug!("{}: reconstructed buy from {}", tx.signature, tx.source);
        return Some(SwapLegs {
            token_in: sol_leg(net.unsigned_abs() as u64),
            token_out: transfer_leg(first_received)?,
        });
    }

    if let Some(first_sent) = sent.filter(|_| net > dust) {
        debug!("{}: reconstructed sell from {}", tx.signature, tx.source);
        return Some(SwapLegs {
            token_in: transfer_leg(first_sent)?,
            token_out: sol_leg(net as u64),
        });
    }

    None
}

/// Decide whether `tx` is a swap made by `wallet` and, if so, which legs it moved.
///
/// Heuristics run in a fixed order and the first one that yields both legs wins:
/// the structured swap event, a two-way token transfer, SOL out / token in (buy),
/// token out / SOL in (sell), and finally a net-SOL reconstruction for known swap
/// programs that emit no event. `None` is the normal answer for transfers, mints and
/// anything else that is not a trade.
pub fn classify(tx: &RawTransaction, wallet: &str) -> Option<SwapLegs> {
    if let Some(legs) = tx.events.swap.as_ref().and_then(from_swap_event) {
        debug!("{}: swap event in={} out={}", tx.signature, legs.token_in.mint, legs.token_out.mint);
        return Some(legs);
    }

    let received: Vec<&TokenTransfer> = tx
        .token_transfers
        .iter()
        .filter(|t| t.to_user_account.as_deref() == Some(wallet))
        .collect();
    let sent: Vec<&TokenTransfer> = tx
        .token_transfers
        .iter()
        .filter(|t| t.from_user_account.as_deref() == Some(wallet))
        .collect();

    if let (Some(first_sent), Some(first_received)) = (sent.first(), received.first()) {
        debug!("{}: bidirectional token transfer", tx.signature);
        return Some(SwapLegs {
            token_in: transfer_leg(first_sent)?,
            token_out: transfer_leg(first_received)?,
        });
    }

    if let Some(first_received) = received.first() {
        let sol_sent = lamports_total(
            tx.native_transfers
                .iter()
                .filter(|t| t.from_user_account.as_deref() == Some(wallet) && t.to_user_account.as_deref() != Some(wallet)),
        );

        if sol_sent > DUST_LAMPORTS {
            debug!("{}: SOL -> token, {} lamports sent", tx.signature, sol_sent);
            return Some(SwapLegs {
                token_in: sol_leg(sol_sent),
                token_out: transfer_leg(first_received)?,
            });
        }
    }

    if let Some(first_sent) = sent.first() {
        let sol_received = lamports_total(
            tx.native_transfers
                .iter()
                .filter(|t| t.to_user_account.as_deref() == Some(wallet) && t.from_user_account.as_deref() != Some(wallet)),
        );

        if sol_received > DUST_LAMPORTS {
            debug!("{}: token -> SOL, {} lamports received", tx.signature, sol_received);
            return Some(SwapLegs {
                token_in: transfer_leg(first_sent)?,
                token_out: sol_leg(sol_received),
            });
        }
    }

    if is_swap_like(tx) {
        return reconstruct_from_net_sol(tx, wallet);
    }

    None
}
