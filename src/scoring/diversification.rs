//! Current-portfolio health score.
//!
//! Components on a 0–100 scale:
//! - Diversification (40%): closeness to target geography/industry group
//!   allocations plus an averaging-down bonus on held quality dips.
//! - Dividend (30%): portfolio-weighted dividend yield.
//! - Quality (30%): portfolio-weighted quality scores.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONCENTRATION_HIGH, CONCENTRATION_MED, COST_BASIS_BOOST_THRESHOLD,
    DIVERSIFICATION_WEIGHT_AVERAGING, DIVERSIFICATION_WEIGHT_GEOGRAPHY,
    DIVERSIFICATION_WEIGHT_INDUSTRY, GAP_DEVIATION_FLOOR, MAX_COST_BASIS_BOOST,
    PORTFOLIO_WEIGHT_DIVERSIFICATION, PORTFOLIO_WEIGHT_DIVIDEND, PORTFOLIO_WEIGHT_QUALITY,
};
use crate::context::PortfolioContext;

/// Overall portfolio health score (0–100 scale).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortfolioScore {
    /// Geographic + industry balance plus averaging-down bonus
    pub diversification_score: f64,
    /// Weighted average dividend yield score
    pub dividend_score: f64,
    /// Weighted average stock quality
    pub quality_score: f64,
    /// Combined score
    pub total: f64,
}

/// Score the current portfolio.
///
/// Deterministic; the same context always yields the same score.
pub fn portfolio_score(context: &PortfolioContext) -> PortfolioScore {
    if context.positions.is_empty() && context.total_value <= 1.0 {
        return PortfolioScore {
            diversification_score: 50.0,
            dividend_score: 50.0,
            quality_score: 50.0,
            total: 50.0,
        };
    }

    let diversification = diversification_subscore(context);
    let diversification_score = diversification * 100.0;

    let total_value = context.total_value;
    let mut weighted_dividend = 0.0;
    let mut weighted_quality = 0.0;
    for (symbol, value) in &context.positions {
        let weight = value / total_value;
        weighted_dividend += context.dividend_of(symbol) * weight;
        weighted_quality += context.score_of(symbol) * weight;
    }

    // 0% yield → 30, 3% → 60, 6%+ → capped at 100.
    let dividend_score = (30.0 + weighted_dividend * 1000.0).min(100.0);
    let quality_score = weighted_quality * 100.0;

    let total = diversification_score * PORTFOLIO_WEIGHT_DIVERSIFICATION
        + dividend_score * PORTFOLIO_WEIGHT_DIVIDEND
        + quality_score * PORTFOLIO_WEIGHT_QUALITY;

    PortfolioScore {
        diversification_score,
        dividend_score,
        quality_score,
        total,
    }
}

/// Diversification subscore in [0,1]: geography gap, industry gap, and
/// averaging-down bonus, weighted 0.40/0.30/0.30.
pub fn diversification_subscore(context: &PortfolioContext) -> f64 {
    let geography = gap_score(
        &context.country_weights,
        &context.country_group_values(),
        context.total_value,
    );
    let industry = gap_score(
        &context.industry_weights,
        &context.industry_group_values(),
        context.total_value,
    );
    let averaging = averaging_down_score(context);

    let total = geography * DIVERSIFICATION_WEIGHT_GEOGRAPHY
        + industry * DIVERSIFICATION_WEIGHT_INDUSTRY
        + averaging * DIVERSIFICATION_WEIGHT_AVERAGING;
    total.clamp(0.0, 1.0)
}

/// Gap score: 1 at perfect target alignment, 0 at an average deviation of
/// `GAP_DEVIATION_FLOOR` or worse.
fn gap_score(
    targets: &std::collections::HashMap<String, f64>,
    group_values: &std::collections::HashMap<String, f64>,
    total_value: f64,
) -> f64 {
    if targets.is_empty() || total_value <= 0.0 {
        // No targets configured: neutral deviation.
        return 1.0 - 0.2 / GAP_DEVIATION_FLOOR;
    }
    let mut deviations = 0.0;
    for (group, &target) in targets {
        let current = group_values.get(group).copied().unwrap_or(0.0) / total_value;
        deviations += (current - target).abs();
    }
    let avg_deviation = deviations / targets.len() as f64;
    (1.0 - avg_deviation / GAP_DEVIATION_FLOOR).max(0.0)
}

/// Averaging-down bonus over held positions.
///
/// A position trading below its average cost earns a boost of up to
/// `MAX_COST_BASIS_BOOST` (twice the loss fraction, while the loss stays
/// within `COST_BASIS_BOOST_THRESHOLD`); oversized positions are damped so
/// the bonus never encourages further concentration.
fn averaging_down_score(context: &PortfolioContext) -> f64 {
    if context.positions.is_empty() {
        return 0.5;
    }
    let total_value = context.total_value;
    let mut scores = Vec::with_capacity(context.positions.len());

    for (symbol, &value) in &context.positions {
        let mut score: f64 = 0.5;

        let avg_price = context.position_avg_prices.get(symbol).copied();
        let current_price = context.current_prices.get(symbol).copied();
        if let (Some(avg), Some(price)) = (avg_price, current_price) {
            if avg > 0.0 && price < avg {
                let loss_pct = (avg - price) / avg;
                if loss_pct <= COST_BASIS_BOOST_THRESHOLD {
                    score = (score + (loss_pct * 2.0).min(MAX_COST_BASIS_BOOST)).min(1.0);
                }
            }
        }

        let position_pct = value / total_value;
        if position_pct > CONCENTRATION_HIGH {
            score *= 0.7;
        } else if position_pct > CONCENTRATION_MED {
            score *= 0.9;
        }
        scores.push(score);
    }

    scores.iter().sum::<f64>() / scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AllocationTargets, GroupTarget};
    use std::collections::HashMap;

    fn targets() -> AllocationTargets {
        let mut country_groups = HashMap::new();
        country_groups.insert(
            "US".to_string(),
            GroupTarget {
                weight: 0.5,
                members: vec!["United States".to_string()],
            },
        );
        country_groups.insert(
            "EU".to_string(),
            GroupTarget {
                weight: 0.5,
                members: vec!["Germany".to_string()],
            },
        );
        AllocationTargets {
            country_groups,
            industry_groups: HashMap::new(),
        }
    }

    fn balanced_context() -> PortfolioContext {
        PortfolioContext::from_parts(
            HashMap::from([
                ("AAPL".to_string(), 5_000.0),
                ("SAP".to_string(), 5_000.0),
            ]),
            10_000.0,
            &targets(),
            HashMap::from([
                ("AAPL".to_string(), "United States".to_string()),
                ("SAP".to_string(), "Germany".to_string()),
            ]),
            HashMap::new(),
            HashMap::from([("AAPL".to_string(), 0.8), ("SAP".to_string(), 0.8)]),
            HashMap::from([("AAPL".to_string(), 0.03), ("SAP".to_string(), 0.03)]),
            HashMap::new(),
            HashMap::new(),
        )
    }

    #[test]
    fn test_balanced_portfolio_scores_high_on_geography() {
        let ctx = balanced_context();
        let score = portfolio_score(&ctx);
        // Perfect geo alignment: geography gap contributes its full weight.
        assert!(score.diversification_score > 50.0, "{score:?}");
        // 3% weighted yield → 60.
        assert!((score.dividend_score - 60.0).abs() < 1e-6);
        // 0.8 weighted quality → 80.
        assert!((score.quality_score - 80.0).abs() < 1e-6);
        assert!(score.total > 0.0 && score.total <= 100.0);
    }

    #[test]
    fn test_concentrated_portfolio_scores_lower() {
        let balanced = portfolio_score(&balanced_context());

        let concentrated = PortfolioContext::from_parts(
            HashMap::from([("AAPL".to_string(), 10_000.0)]),
            10_000.0,
            &targets(),
            HashMap::from([("AAPL".to_string(), "United States".to_string())]),
            HashMap::new(),
            HashMap::from([("AAPL".to_string(), 0.8)]),
            HashMap::from([("AAPL".to_string(), 0.03)]),
            HashMap::new(),
            HashMap::new(),
        );
        let score = portfolio_score(&concentrated);
        assert!(
            score.diversification_score < balanced.diversification_score,
            "{} vs {}",
            score.diversification_score,
            balanced.diversification_score
        );
    }

    #[test]
    fn test_cost_basis_boost_applies_below_average_cost() {
        let mut ctx = balanced_context();
        ctx.position_avg_prices.insert("AAPL".to_string(), 100.0);
        ctx.current_prices.insert("AAPL".to_string(), 90.0);
        let boosted = diversification_subscore(&ctx);

        let baseline = diversification_subscore(&balanced_context());
        assert!(boosted > baseline, "{boosted} vs {baseline}");

        // A loss beyond the threshold earns no boost.
        ctx.current_prices.insert("AAPL".to_string(), 50.0);
        let deep_loss = diversification_subscore(&ctx);
        assert!((deep_loss - baseline).abs() < 1e-9);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let ctx = balanced_context();
        let a = portfolio_score(&ctx);
        let b = portfolio_score(&ctx);
        assert_eq!(a.total.to_bits(), b.total.to_bits());
        assert_eq!(
            a.diversification_score.to_bits(),
            b.diversification_score.to_bits()
        );
    }

    #[test]
    fn test_empty_portfolio_is_neutral() {
        let ctx = PortfolioContext::from_parts(
            HashMap::new(),
            0.0,
            &AllocationTargets::default(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        );
        let score = portfolio_score(&ctx);
        assert!((score.total - 50.0).abs() < 1e-9);
    }
}
