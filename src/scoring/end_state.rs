//! End-state scoring of simulated portfolios.
//!
//! The scalar end-state score in [0,1] is a convex combination of the
//! diversification subscore, portfolio dividend yield, weighted quality, and
//! four risk-adjusted terms from the metrics cache. Sharpe and Sortino are
//! normalized with `clamp(x / cap, 0, 1)`; drawdown and volatility enter as
//! resilience scores `1 − |x|` and `1 − clamp(vol / cap, 0, 1)`.

use std::collections::HashMap;

use crate::constants::{
    DEFAULT_STOCK_SCORE, END_STATE_WEIGHT_DIVERSIFICATION, END_STATE_WEIGHT_DIVIDEND,
    END_STATE_WEIGHT_DRAWDOWN, END_STATE_WEIGHT_QUALITY, END_STATE_WEIGHT_SHARPE,
    END_STATE_WEIGHT_SORTINO, END_STATE_WEIGHT_VOLATILITY, SHARPE_CAP, SORTINO_CAP,
    VOLATILITY_CAP,
};
use crate::metrics::SymbolMetrics;

/// Scored end state: the scalar plus its per-component breakdown.
#[derive(Debug, Clone)]
pub struct EndStateScore {
    /// Weighted end-state score in [0,1]
    pub score: f64,
    /// Component subscores (each in [0,1]) keyed by component name
    pub breakdown: HashMap<String, f64>,
}

/// Score a simulated end state.
///
/// `diversification_score` is the precomputed [0,1] diversification subscore
/// of the end context. Metrics absent from `metrics_cache` count as zero.
/// Deterministic and idempotent: identical inputs yield bit-identical output.
pub fn score_end_state(
    positions: &HashMap<String, f64>,
    total_value: f64,
    diversification_score: f64,
    stock_scores: &HashMap<String, f64>,
    metrics_cache: &HashMap<String, SymbolMetrics>,
) -> EndStateScore {
    let total = if total_value > 0.0 { total_value } else { 1.0 };

    let mut dividend_yield = 0.0;
    let mut quality = 0.0;
    let mut sharpe = 0.0;
    let mut sortino = 0.0;
    let mut drawdown_resilience = 0.0;
    let mut volatility_calm = 0.0;

    // Iterate in sorted symbol order so float accumulation is reproducible.
    let mut symbols: Vec<&String> = positions.keys().collect();
    symbols.sort();

    for symbol in symbols {
        let weight = positions[symbol] / total;
        let metrics = metrics_cache.get(symbol).copied().unwrap_or_default();

        dividend_yield += metrics.dividend_yield * weight;
        quality += stock_scores
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_STOCK_SCORE)
            * weight;
        sharpe += (metrics.sharpe / SHARPE_CAP).clamp(0.0, 1.0) * weight;
        sortino += (metrics.sortino / SORTINO_CAP).clamp(0.0, 1.0) * weight;
        drawdown_resilience += (1.0 - metrics.max_drawdown.abs()).clamp(0.0, 1.0) * weight;
        volatility_calm +=
            (1.0 - (metrics.volatility_annual / VOLATILITY_CAP).clamp(0.0, 1.0)) * weight;
    }

    let diversification = diversification_score.clamp(0.0, 1.0);
    // 0% yield → 0.30, 6%+ → ~1.0.
    let dividend = ((30.0 + dividend_yield * 1000.0) / 100.0).min(1.0);

    let score = (diversification * END_STATE_WEIGHT_DIVERSIFICATION
        + dividend * END_STATE_WEIGHT_DIVIDEND
        + quality * END_STATE_WEIGHT_QUALITY
        + sharpe * END_STATE_WEIGHT_SHARPE
        + sortino * END_STATE_WEIGHT_SORTINO
        + drawdown_resilience * END_STATE_WEIGHT_DRAWDOWN
        + volatility_calm * END_STATE_WEIGHT_VOLATILITY)
        .clamp(0.0, 1.0);

    let breakdown = HashMap::from([
        ("diversification".to_string(), diversification),
        ("dividend".to_string(), dividend),
        ("quality".to_string(), quality),
        ("sharpe".to_string(), sharpe),
        ("sortino".to_string(), sortino),
        ("drawdown".to_string(), drawdown_resilience),
        ("volatility".to_string(), volatility_calm),
    ]);

    EndStateScore { score, breakdown }
}
