//! Pure sequence simulation.
//!
//! Applies a sequence to a starting `(context, cash)` pair and returns the
//! end state. Cash is part of the portfolio, so `total_value` is invariant
//! under every cash↔stock conversion. The input context is never mutated.

use std::collections::HashMap;

use crate::context::PortfolioContext;
use crate::models::{ActionCandidate, Security, TradeSide};

/// Simulate executing `sequence` against `context` with `available_cash`.
///
/// SELLs reduce (and possibly remove) the position and credit cash; BUYs
/// debit cash and create or grow the position, carrying the security's
/// country/industry metadata into the end state. A BUY exceeding remaining
/// cash is skipped; the feasibility filter guarantees this does not happen
/// for sequences that reach evaluation.
pub fn simulate_sequence(
    sequence: &[ActionCandidate],
    context: &PortfolioContext,
    available_cash: f64,
    securities: &[Security],
) -> (PortfolioContext, f64) {
    let securities_by_symbol: HashMap<&str, &Security> =
        securities.iter().map(|s| (s.symbol.as_str(), s)).collect();

    let mut end = context.clone();
    let mut cash = available_cash;

    for action in sequence {
        match action.side {
            TradeSide::Sell => {
                let current = end.positions.get(&action.symbol).copied().unwrap_or(0.0);
                let remaining = current - action.value_eur;
                if remaining > 0.0 {
                    end.positions.insert(action.symbol.clone(), remaining);
                } else {
                    end.positions.remove(&action.symbol);
                }
                cash += action.value_eur;
            }
            TradeSide::Buy => {
                if action.value_eur > cash {
                    continue;
                }
                *end.positions.entry(action.symbol.clone()).or_insert(0.0) += action.value_eur;
                if let Some(security) = securities_by_symbol.get(action.symbol.as_str()) {
                    if let Some(country) = &security.country {
                        end.stock_countries
                            .insert(action.symbol.clone(), country.clone());
                    }
                    if let Some(industry) = &security.industry {
                        end.stock_industries
                            .insert(action.symbol.clone(), industry.clone());
                    }
                }
                cash -= action.value_eur;
            }
        }
        // total_value unchanged: stock and cash are both part of the portfolio.
    }

    (end, cash)
}
