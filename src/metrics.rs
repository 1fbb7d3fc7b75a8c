//! Per-symbol metric access for end-state scoring.
//!
//! The planner consumes ten precomputed metrics per symbol from an external
//! metrics store. Missing symbols and missing individual metrics coerce to
//! zero; scoring never fails on a cache miss.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Names of the metrics the scorer consumes, as stored by the metrics
/// pipeline.
pub const REQUIRED_METRICS: [&str; 10] = [
    "CAGR_5Y",
    "DIVIDEND_YIELD",
    "CONSISTENCY_SCORE",
    "FINANCIAL_STRENGTH",
    "DIVIDEND_CONSISTENCY",
    "PAYOUT_RATIO",
    "SORTINO",
    "VOLATILITY_ANNUAL",
    "MAX_DRAWDOWN",
    "SHARPE",
];

/// Precomputed metrics for one symbol. Absent values are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetrics {
    /// 5-year compound annual growth rate (fraction)
    pub cagr_5y: f64,
    /// Trailing dividend yield (fraction)
    pub dividend_yield: f64,
    /// Growth consistency score (0..1)
    pub consistency_score: f64,
    /// Financial strength score (0..1)
    pub financial_strength: f64,
    /// Dividend consistency score (0..1)
    pub dividend_consistency: f64,
    /// Payout ratio (fraction)
    pub payout_ratio: f64,
    /// Annualized Sortino ratio
    pub sortino: f64,
    /// Annualized volatility (fraction)
    pub volatility_annual: f64,
    /// Maximum drawdown (negative fraction or magnitude; only `|x|` is used)
    pub max_drawdown: f64,
    /// Annualized Sharpe ratio
    pub sharpe: f64,
}

impl SymbolMetrics {
    /// Build from a name → value map, coercing missing entries to 0.
    pub fn from_map(values: &HashMap<String, f64>) -> Self {
        let get = |key: &str| values.get(key).copied().unwrap_or(0.0);
        Self {
            cagr_5y: get("CAGR_5Y"),
            dividend_yield: get("DIVIDEND_YIELD"),
            consistency_score: get("CONSISTENCY_SCORE"),
            financial_strength: get("FINANCIAL_STRENGTH"),
            dividend_consistency: get("DIVIDEND_CONSISTENCY"),
            payout_ratio: get("PAYOUT_RATIO"),
            sortino: get("SORTINO"),
            volatility_annual: get("VOLATILITY_ANNUAL"),
            max_drawdown: get("MAX_DRAWDOWN"),
            sharpe: get("SHARPE"),
        }
    }
}

/// Source of per-symbol metrics.
///
/// Implementations wrap whatever store the outer service keeps its
/// calculations in. A miss must surface as `SymbolMetrics::default()`, not
/// as an error.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Fetch metrics for one symbol, zero-filled on miss.
    async fn metrics_for(&self, symbol: &str) -> Result<SymbolMetrics>;
}

/// In-memory metrics provider backed by a fixed map.
///
/// Useful for tests and for callers that prefetch metrics themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticMetrics {
    metrics: HashMap<String, SymbolMetrics>,
}

impl StaticMetrics {
    /// Create a provider over the given map.
    pub fn new(metrics: HashMap<String, SymbolMetrics>) -> Self {
        Self { metrics }
    }

    /// Insert metrics for one symbol.
    pub fn insert(&mut self, symbol: impl Into<String>, metrics: SymbolMetrics) {
        self.metrics.insert(symbol.into(), metrics);
    }
}

#[async_trait]
impl MetricsProvider for StaticMetrics {
    async fn metrics_for(&self, symbol: &str) -> Result<SymbolMetrics> {
        Ok(self.metrics.get(symbol).copied().unwrap_or_default())
    }
}
