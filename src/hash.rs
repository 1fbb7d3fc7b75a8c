//! Deterministic fingerprints for portfolios and action sequences.
//!
//! Both hashes are SHA-256 digests truncated to 128 bits and rendered as
//! 32 lowercase hex characters. Inputs are canonicalized (sorted) before
//! hashing so the result is invariant to insertion order and stable across
//! runs.

use sha2::{Digest, Sha256};

use crate::models::{ActionCandidate, PendingOrder, Position, Security};

/// Digest length in bytes (128 bits → 32 hex chars).
const DIGEST_BYTES: usize = 16;

/// Fingerprint of the portfolio state the planner is solving for.
///
/// Covers positions, the active state of the security universe, cash
/// balances per currency, and pending orders. Any change to one of these
/// invalidates previously persisted planner work.
pub fn portfolio_hash(
    positions: &[Position],
    securities: &[Security],
    cash_balances: &[(String, f64)],
    pending_orders: &[PendingOrder],
) -> String {
    let mut position_entries: Vec<(String, u32)> = positions
        .iter()
        .map(|p| (p.symbol.clone(), p.quantity))
        .collect();
    position_entries.sort();

    let mut security_entries: Vec<(String, bool)> = securities
        .iter()
        .map(|s| (s.symbol.clone(), s.active))
        .collect();
    security_entries.sort();

    let mut cash_entries: Vec<(String, i64)> = cash_balances
        .iter()
        .map(|(ccy, amount)| (ccy.clone(), to_cents(*amount)))
        .collect();
    cash_entries.sort();

    let mut order_entries: Vec<(String, String, u32)> = pending_orders
        .iter()
        .map(|o| (o.symbol.clone(), o.side.as_str().to_string(), o.quantity))
        .collect();
    order_entries.sort();

    let mut hasher = Sha256::new();
    for (symbol, quantity) in &position_entries {
        hasher.update(symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(quantity.to_le_bytes());
        hasher.update(b";");
    }
    hasher.update(b"#");
    for (symbol, active) in &security_entries {
        hasher.update(symbol.as_bytes());
        hasher.update(b"|");
        hasher.update([*active as u8]);
        hasher.update(b";");
    }
    hasher.update(b"#");
    for (currency, cents) in &cash_entries {
        hasher.update(currency.as_bytes());
        hasher.update(b"|");
        hasher.update(cents.to_le_bytes());
        hasher.update(b";");
    }
    hasher.update(b"#");
    for (symbol, side, quantity) in &order_entries {
        hasher.update(symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(side.as_bytes());
        hasher.update(b"|");
        hasher.update(quantity.to_le_bytes());
        hasher.update(b";");
    }

    hex::encode(&hasher.finalize()[..DIGEST_BYTES])
}

/// Fingerprint of an ordered action sequence.
///
/// Hashes the ordered `(symbol, side, quantity)` tuples; two sequences with
/// the same actions in a different order hash differently.
pub fn sequence_hash(sequence: &[ActionCandidate]) -> String {
    let mut hasher = Sha256::new();
    for action in sequence {
        hasher.update(action.symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(action.side.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(action.quantity.to_le_bytes());
        hasher.update(b";");
    }
    hex::encode(&hasher.finalize()[..DIGEST_BYTES])
}

/// Round a cash amount to integer cents for stable hashing.
fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}
