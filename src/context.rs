//! Immutable portfolio snapshot consumed by scoring and simulation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_STOCK_SCORE, OTHER_GROUP};
use crate::models::{Position, Security};

/// Allocation target for one group of countries or industries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTarget {
    /// Target weight of the group (0..1)
    pub weight: f64,
    /// Countries or industries belonging to the group
    pub members: Vec<String>,
}

/// Geography and industry allocation targets with group membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationTargets {
    /// Country group name → target and member countries
    pub country_groups: HashMap<String, GroupTarget>,
    /// Industry group name → target and member industries
    pub industry_groups: HashMap<String, GroupTarget>,
}

/// Immutable snapshot of the portfolio for one planning call.
///
/// All maps collapse missing metadata to explicit defaults at construction
/// (`"OTHER"` group, quality 0.5, dividend 0.0) so no downstream code
/// branches on absence. Values are in EUR throughout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioContext {
    /// Symbol → current position value in EUR (always > 0)
    pub positions: HashMap<String, f64>,
    /// Positions plus cash; clamped to a small positive floor
    pub total_value: f64,
    /// Country group → target weight (normalized to sum to 1)
    pub country_weights: HashMap<String, f64>,
    /// Industry group → target weight (normalized to sum to 1)
    pub industry_weights: HashMap<String, f64>,
    /// Symbol → country
    pub stock_countries: HashMap<String, String>,
    /// Symbol → industry (comma-separated when multiple)
    pub stock_industries: HashMap<String, String>,
    /// Symbol → latest quality score (0..1)
    pub stock_scores: HashMap<String, f64>,
    /// Symbol → dividend yield (fraction)
    pub stock_dividends: HashMap<String, f64>,
    /// Country → owning group (built from the group definitions)
    pub country_to_group: HashMap<String, String>,
    /// Industry → owning group
    pub industry_to_group: HashMap<String, String>,
    /// Symbol → average purchase price (native currency)
    pub position_avg_prices: HashMap<String, f64>,
    /// Symbol → current market price (native currency)
    pub current_prices: HashMap<String, f64>,
}

impl PortfolioContext {
    /// Build a context from repository-shaped inputs.
    ///
    /// This is the construction path an outer service uses: positions and
    /// securities from their repositories, allocation targets with group
    /// membership lists, latest quality scores and dividend yields, and a
    /// price snapshot.
    pub fn from_universe(
        positions: &[Position],
        securities: &[Security],
        targets: &AllocationTargets,
        stock_scores: &HashMap<String, f64>,
        stock_dividends: &HashMap<String, f64>,
        current_prices: &HashMap<String, f64>,
        available_cash: f64,
    ) -> Self {
        let position_values: HashMap<String, f64> = positions
            .iter()
            .filter(|p| p.market_value_eur > 0.0)
            .map(|p| (p.symbol.clone(), p.market_value_eur))
            .collect();
        let position_avg_prices = positions
            .iter()
            .map(|p| (p.symbol.clone(), p.avg_price))
            .collect();

        let stock_countries = securities
            .iter()
            .filter_map(|s| s.country.as_ref().map(|c| (s.symbol.clone(), c.clone())))
            .collect();
        let stock_industries = securities
            .iter()
            .filter_map(|s| s.industry.as_ref().map(|i| (s.symbol.clone(), i.clone())))
            .collect();

        let total = position_values.values().sum::<f64>() + available_cash;

        Self::from_parts(
            position_values,
            total,
            targets,
            stock_countries,
            stock_industries,
            stock_scores.clone(),
            stock_dividends.clone(),
            position_avg_prices,
            current_prices.clone(),
        )
    }

    /// Build a context from already-assembled maps.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        positions: HashMap<String, f64>,
        total_value: f64,
        targets: &AllocationTargets,
        stock_countries: HashMap<String, String>,
        stock_industries: HashMap<String, String>,
        stock_scores: HashMap<String, f64>,
        stock_dividends: HashMap<String, f64>,
        position_avg_prices: HashMap<String, f64>,
        current_prices: HashMap<String, f64>,
    ) -> Self {
        let country_weights = normalize_weights(
            targets
                .country_groups
                .iter()
                .map(|(name, g)| (name.clone(), g.weight)),
        );
        let industry_weights = normalize_weights(
            targets
                .industry_groups
                .iter()
                .map(|(name, g)| (name.clone(), g.weight)),
        );

        let country_to_group = build_reverse_mapping(&targets.country_groups);
        let industry_to_group = build_reverse_mapping(&targets.industry_groups);

        Self {
            positions,
            // Floor keeps downstream divisions defined for degenerate inputs.
            total_value: if total_value > 0.0 { total_value } else { 1.0 },
            country_weights,
            industry_weights,
            stock_countries,
            stock_industries,
            stock_scores,
            stock_dividends,
            country_to_group,
            industry_to_group,
            position_avg_prices,
            current_prices,
        }
    }

    /// Current fraction of total value held in `symbol` (0 when absent).
    pub fn weight_of(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).copied().unwrap_or(0.0) / self.total_value
    }

    /// Quality score for `symbol`, defaulting to 0.5.
    pub fn score_of(&self, symbol: &str) -> f64 {
        self.stock_scores
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_STOCK_SCORE)
    }

    /// Dividend yield for `symbol`, defaulting to 0.0.
    pub fn dividend_of(&self, symbol: &str) -> f64 {
        self.stock_dividends.get(symbol).copied().unwrap_or(0.0)
    }

    /// Allocation group of a symbol's country ("OTHER" when unmapped).
    pub fn country_group_of(&self, symbol: &str) -> &str {
        self.stock_countries
            .get(symbol)
            .and_then(|c| self.country_to_group.get(c))
            .map(String::as_str)
            .unwrap_or(OTHER_GROUP)
    }

    /// Allocation groups of a symbol's industries ("OTHER" when unmapped).
    ///
    /// Industries are comma-separated; each resolves to its group
    /// independently.
    pub fn industry_groups_of(&self, symbol: &str) -> Vec<&str> {
        match self.stock_industries.get(symbol) {
            Some(industries) => industries
                .split(',')
                .map(str::trim)
                .filter(|i| !i.is_empty())
                .map(|i| {
                    self.industry_to_group
                        .get(i)
                        .map(String::as_str)
                        .unwrap_or(OTHER_GROUP)
                })
                .collect(),
            None => vec![OTHER_GROUP],
        }
    }

    /// Current EUR value held per country group.
    pub fn country_group_values(&self) -> HashMap<String, f64> {
        let mut values: HashMap<String, f64> = HashMap::new();
        for (symbol, value) in &self.positions {
            let group = self.country_group_of(symbol).to_string();
            *values.entry(group).or_insert(0.0) += value;
        }
        values
    }

    /// Current EUR value held per industry group.
    ///
    /// A position with several industries contributes its full value to each
    /// of its groups, matching how targets are expressed.
    pub fn industry_group_values(&self) -> HashMap<String, f64> {
        let mut values: HashMap<String, f64> = HashMap::new();
        for (symbol, value) in &self.positions {
            for group in self.industry_groups_of(symbol) {
                *values.entry(group.to_string()).or_insert(0.0) += value;
            }
        }
        values
    }
}

fn normalize_weights(weights: impl Iterator<Item = (String, f64)>) -> HashMap<String, f64> {
    let collected: HashMap<String, f64> = weights.filter(|(_, w)| *w > 0.0).collect();
    let sum: f64 = collected.values().sum();
    if sum <= 0.0 {
        return collected;
    }
    collected.into_iter().map(|(k, w)| (k, w / sum)).collect()
}

fn build_reverse_mapping(groups: &HashMap<String, GroupTarget>) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    for (group_name, target) in groups {
        for member in &target.members {
            mapping.insert(member.clone(), group_name.clone());
        }
    }
    mapping
}
