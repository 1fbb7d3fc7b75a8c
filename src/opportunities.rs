//! Opportunity identification: turning portfolio drift into action candidates.
//!
//! Two modes produce the same five-category output:
//!
//! - **Weight-driven**: preferred when an external optimizer supplied
//!   per-symbol target weights. Candidates close the gap between current and
//!   target weights.
//! - **Heuristic**: five independent scans (profit-taking, averaging-down,
//!   rebalance sells, rebalance buys, opportunity buys) against group
//!   allocation targets and quality scores.
//!
//! Every candidate passes the "worthwhile" filter: its EUR value must recover
//! twice its expected transaction cost.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::constants::{
    AVERAGING_DOWN_MIN_DIP, CONCENTRATION_MED, DEFAULT_EXPECTED_CAGR, MIN_STOCK_SCORE,
    MIN_WEIGHT_GAP, OPPORTUNITY_MIN_QUALITY, PROFIT_TAKING_FRACTION, PROFIT_TAKING_MIN_GAIN,
    REBALANCE_TOLERANCE, WINDFALL_HORIZON_YEARS, WINDFALL_MARGIN,
};
use crate::context::PortfolioContext;
use crate::metrics::SymbolMetrics;
use crate::models::{
    ActionCandidate, CooldownSets, Opportunities, Position, Security, TradeSide, tags,
};

/// Shared inputs for opportunity identification.
#[derive(Debug, Clone, Copy)]
pub struct OpportunityInputs<'a> {
    /// Current portfolio snapshot
    pub context: &'a PortfolioContext,
    /// Current positions
    pub positions: &'a [Position],
    /// Security universe
    pub securities: &'a [Security],
    /// Latest native prices; 0 or missing suppresses the symbol
    pub current_prices: &'a HashMap<String, f64>,
    /// Available EUR cash
    pub available_cash: f64,
    /// Trade cooldown sets
    pub cooldowns: &'a CooldownSets,
    /// Metrics for held symbols (windfall detection); may be empty
    pub metrics: &'a HashMap<String, SymbolMetrics>,
}

struct WeightGap {
    symbol: String,
    current: f64,
    target: f64,
    gap: f64,
    gap_value: f64,
}

/// Identify opportunities from optimizer target weights.
///
/// Emits BUY candidates for underweight symbols and SELL candidates for
/// overweight symbols, skipping gaps under 0.5% and trades that cannot
/// recover twice their transaction cost.
pub fn identify_opportunities_from_weights(
    inputs: &OpportunityInputs<'_>,
    target_weights: &HashMap<String, f64>,
    config: &PlannerConfig,
) -> Opportunities {
    let mut opportunities = Opportunities::default();
    let ctx = inputs.context;
    let total_value = ctx.total_value;
    if total_value <= 0.0 {
        return opportunities;
    }

    let securities_by_symbol: HashMap<&str, &Security> = inputs
        .securities
        .iter()
        .map(|s| (s.symbol.as_str(), s))
        .collect();
    let positions_by_symbol: HashMap<&str, &Position> = inputs
        .positions
        .iter()
        .map(|p| (p.symbol.as_str(), p))
        .collect();

    for gap_info in weight_gaps(target_weights, ctx) {
        let Some(&price) = inputs.current_prices.get(&gap_info.symbol) else {
            continue;
        };
        if price <= 0.0 {
            continue;
        }
        if !config.is_trade_worthwhile(gap_info.gap_value) {
            debug!(
                symbol = %gap_info.symbol,
                gap_value = gap_info.gap_value,
                "gap too small to cover transaction costs"
            );
            continue;
        }

        let security = securities_by_symbol.get(gap_info.symbol.as_str()).copied();
        let position = positions_by_symbol.get(gap_info.symbol.as_str()).copied();

        if gap_info.gap > 0.0 {
            process_buy_gap(&gap_info, security, position, price, &mut opportunities);
        } else {
            if inputs.cooldowns.recently_sold.contains(&gap_info.symbol) {
                debug!(symbol = %gap_info.symbol, "sell suppressed by cooldown");
                continue;
            }
            if let Some(position) = position {
                process_sell_gap(&gap_info, security, position, price, &mut opportunities);
            }
        }
    }

    opportunities.sort_by_priority();
    info!(
        rebalance_sells = opportunities.rebalance_sells.len(),
        rebalance_buys = opportunities.rebalance_buys.len(),
        averaging_down = opportunities.averaging_down.len(),
        "weight-based opportunities identified"
    );
    opportunities
}

fn weight_gaps(target_weights: &HashMap<String, f64>, ctx: &PortfolioContext) -> Vec<WeightGap> {
    let total_value = ctx.total_value;
    let mut gaps: Vec<WeightGap> = Vec::new();

    for (symbol, &target) in target_weights {
        let current = ctx.weight_of(symbol);
        let gap = target - current;
        if gap.abs() > MIN_WEIGHT_GAP {
            gaps.push(WeightGap {
                symbol: symbol.clone(),
                current,
                target,
                gap,
                gap_value: gap * total_value,
            });
        }
    }

    // Held symbols the optimizer assigns no target should be wound down.
    for symbol in ctx.positions.keys() {
        if target_weights.contains_key(symbol) {
            continue;
        }
        let current = ctx.weight_of(symbol);
        if current > MIN_WEIGHT_GAP {
            gaps.push(WeightGap {
                symbol: symbol.clone(),
                current,
                target: 0.0,
                gap: -current,
                gap_value: -current * total_value,
            });
        }
    }

    gaps.sort_by(|a, b| {
        b.gap
            .abs()
            .partial_cmp(&a.gap.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    gaps
}

fn process_buy_gap(
    gap_info: &WeightGap,
    security: Option<&Security>,
    position: Option<&Position>,
    price: f64,
    opportunities: &mut Opportunities,
) {
    let Some(security) = security else { return };
    if !security.allow_buy {
        return;
    }

    let mut quantity = (gap_info.gap_value / price) as u32;
    if quantity < security.min_lot {
        quantity = security.min_lot;
    }
    if quantity == 0 {
        return;
    }
    let trade_value = quantity as f64 * price;
    let currency = position
        .map(|p| p.currency.clone())
        .unwrap_or_else(|| security.currency.clone());

    let averaging_down = position.is_some_and(|p| p.avg_price > price);
    let (category_tags, is_averaging) = if averaging_down {
        (vec![tags::AVERAGING_DOWN, tags::OPTIMIZER_TARGET], true)
    } else {
        (vec![tags::REBALANCE, tags::OPTIMIZER_TARGET], false)
    };

    let candidate = ActionCandidate {
        side: TradeSide::Buy,
        symbol: gap_info.symbol.clone(),
        name: security.name.clone(),
        quantity,
        price,
        value_eur: trade_value,
        currency,
        priority: gap_info.gap.abs() * 100.0,
        reason: format!(
            "Optimizer target: {:.1}% (current: {:.1}%)",
            gap_info.target * 100.0,
            gap_info.current * 100.0
        ),
        tags: category_tags.into_iter().map(str::to_string).collect(),
    };

    if is_averaging {
        opportunities.averaging_down.push(candidate);
    } else {
        opportunities.rebalance_buys.push(candidate);
    }
}

fn process_sell_gap(
    gap_info: &WeightGap,
    security: Option<&Security>,
    position: &Position,
    price: f64,
    opportunities: &mut Opportunities,
) {
    if let Some(security) = security {
        if !security.allow_sell {
            return;
        }
        if position.quantity <= security.min_lot {
            debug!(symbol = %gap_info.symbol, "at min_lot, can't reduce further");
            return;
        }
    }

    let sell_value = gap_info.gap_value.abs();
    let mut quantity = (sell_value / price) as u32;

    // Leave at least min_lot behind, or exit entirely.
    if let Some(security) = security {
        let remaining = position.quantity.saturating_sub(quantity);
        if remaining > 0 && remaining < security.min_lot {
            quantity = position.quantity - security.min_lot;
        }
    }
    if quantity == 0 {
        return;
    }

    opportunities.rebalance_sells.push(ActionCandidate {
        side: TradeSide::Sell,
        symbol: gap_info.symbol.clone(),
        name: security
            .map(|s| s.name.clone())
            .unwrap_or_else(|| gap_info.symbol.clone()),
        quantity,
        price,
        value_eur: quantity as f64 * price,
        currency: position.currency.clone(),
        priority: gap_info.gap.abs() * 100.0,
        reason: format!(
            "Optimizer target: {:.1}% (current: {:.1}%)",
            gap_info.target * 100.0,
            gap_info.current * 100.0
        ),
        tags: vec![
            tags::REBALANCE.to_string(),
            tags::OPTIMIZER_TARGET.to_string(),
        ],
    });
}

/// Identify opportunities heuristically, without optimizer targets.
///
/// Runs five independent scans and returns their union. Each category is
/// sorted by descending priority.
pub fn identify_opportunities(
    inputs: &OpportunityInputs<'_>,
    config: &PlannerConfig,
) -> Opportunities {
    let mut opportunities = Opportunities {
        profit_taking: identify_profit_taking(inputs, config),
        averaging_down: identify_averaging_down(inputs, config),
        rebalance_sells: identify_rebalance_sells(inputs, config),
        rebalance_buys: identify_rebalance_buys(inputs, config),
        opportunity_buys: identify_opportunity_buys(inputs, config),
    };
    opportunities.sort_by_priority();

    info!(
        profit_taking = opportunities.profit_taking.len(),
        averaging_down = opportunities.averaging_down.len(),
        rebalance_sells = opportunities.rebalance_sells.len(),
        rebalance_buys = opportunities.rebalance_buys.len(),
        opportunity_buys = opportunities.opportunity_buys.len(),
        "heuristic opportunities identified"
    );
    opportunities
}

/// Positions with gains large enough to trim.
///
/// A gain that exceeds what the symbol's 5-year CAGR would have produced over
/// a multi-year horizon (plus a margin) is a windfall and tagged accordingly.
fn identify_profit_taking(
    inputs: &OpportunityInputs<'_>,
    config: &PlannerConfig,
) -> Vec<ActionCandidate> {
    let mut candidates = Vec::new();
    let securities: HashMap<&str, &Security> = inputs
        .securities
        .iter()
        .map(|s| (s.symbol.as_str(), s))
        .collect();

    for position in inputs.positions {
        let Some(&security) = securities.get(position.symbol.as_str()) else {
            continue;
        };
        if !security.allow_sell
            || inputs.cooldowns.recently_sold.contains(&position.symbol)
            || position.quantity <= security.min_lot
            || position.avg_price <= 0.0
        {
            continue;
        }
        let Some(&price) = inputs.current_prices.get(&position.symbol) else {
            continue;
        };
        if price <= 0.0 {
            continue;
        }

        let gain = (price - position.avg_price) / position.avg_price;
        if gain < PROFIT_TAKING_MIN_GAIN {
            continue;
        }

        let cagr = inputs
            .metrics
            .get(&position.symbol)
            .map(|m| m.cagr_5y)
            .filter(|&c| c > 0.0)
            .unwrap_or(DEFAULT_EXPECTED_CAGR);
        let expected_growth = cagr * WINDFALL_HORIZON_YEARS;
        let is_windfall = gain >= expected_growth + WINDFALL_MARGIN;

        let mut quantity =
            ((position.quantity as f64 * PROFIT_TAKING_FRACTION) as u32).max(1);
        let remaining = position.quantity.saturating_sub(quantity);
        if remaining > 0 && remaining < security.min_lot {
            quantity = position.quantity - security.min_lot;
        }
        if quantity == 0 {
            continue;
        }
        let value_eur = quantity as f64 * price;
        if !config.is_trade_worthwhile(value_eur) {
            continue;
        }

        let mut candidate_tags = vec![tags::PROFIT_TAKING.to_string()];
        if is_windfall {
            candidate_tags.insert(0, tags::WINDFALL.to_string());
        }

        candidates.push(ActionCandidate {
            side: TradeSide::Sell,
            symbol: position.symbol.clone(),
            name: security.name.clone(),
            quantity,
            price,
            value_eur,
            currency: position.currency.clone(),
            priority: gain * 100.0 * security.priority_multiplier,
            reason: format!(
                "Up {:.0}% vs €{:.2} average cost",
                gain * 100.0,
                position.avg_price
            ),
            tags: candidate_tags,
        });
    }

    candidates
}

/// Held quality positions trading meaningfully below average cost.
fn identify_averaging_down(
    inputs: &OpportunityInputs<'_>,
    config: &PlannerConfig,
) -> Vec<ActionCandidate> {
    let mut candidates = Vec::new();
    let securities: HashMap<&str, &Security> = inputs
        .securities
        .iter()
        .map(|s| (s.symbol.as_str(), s))
        .collect();
    let base_trade = config.min_trade_amount();

    for position in inputs.positions {
        let Some(&security) = securities.get(position.symbol.as_str()) else {
            continue;
        };
        if !security.allow_buy
            || inputs.cooldowns.recently_bought.contains(&position.symbol)
            || position.avg_price <= 0.0
        {
            continue;
        }
        let Some(&price) = inputs.current_prices.get(&position.symbol) else {
            continue;
        };
        if price <= 0.0 {
            continue;
        }

        let dip = (position.avg_price - price) / position.avg_price;
        if dip < AVERAGING_DOWN_MIN_DIP {
            continue;
        }
        let quality = inputs.context.score_of(&position.symbol);
        if quality < MIN_STOCK_SCORE {
            continue;
        }

        let quantity = ((base_trade / price) as u32).max(security.min_lot);
        let value_eur = quantity as f64 * price;
        if !config.is_trade_worthwhile(value_eur) {
            continue;
        }

        candidates.push(ActionCandidate {
            side: TradeSide::Buy,
            symbol: position.symbol.clone(),
            name: security.name.clone(),
            quantity,
            price,
            value_eur,
            currency: position.currency.clone(),
            priority: dip * 100.0 * quality * security.priority_multiplier,
            reason: format!(
                "Quality position {:.0}% below €{:.2} average cost",
                dip * 100.0,
                position.avg_price
            ),
            tags: vec![tags::AVERAGING_DOWN.to_string()],
        });
    }

    candidates
}

/// Trim positions in country groups running above their target weight.
fn identify_rebalance_sells(
    inputs: &OpportunityInputs<'_>,
    config: &PlannerConfig,
) -> Vec<ActionCandidate> {
    let ctx = inputs.context;
    let mut candidates = Vec::new();
    let securities: HashMap<&str, &Security> = inputs
        .securities
        .iter()
        .map(|s| (s.symbol.as_str(), s))
        .collect();
    let group_values = ctx.country_group_values();

    for (group, &target) in &ctx.country_weights {
        let current = group_values.get(group).copied().unwrap_or(0.0) / ctx.total_value;
        let drift = current - target;
        if drift <= REBALANCE_TOLERANCE {
            continue;
        }

        // Largest positions in the group absorb the excess first.
        let mut group_positions: Vec<&Position> = inputs
            .positions
            .iter()
            .filter(|p| ctx.country_group_of(&p.symbol) == group)
            .collect();
        group_positions.sort_by(|a, b| {
            b.market_value_eur
                .partial_cmp(&a.market_value_eur)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut remaining_excess = drift * ctx.total_value;
        for position in group_positions {
            if remaining_excess <= 0.0 {
                break;
            }
            let Some(&security) = securities.get(position.symbol.as_str()) else {
                continue;
            };
            if !security.allow_sell
                || inputs.cooldowns.recently_sold.contains(&position.symbol)
                || position.quantity <= security.min_lot
            {
                continue;
            }
            let Some(&price) = inputs.current_prices.get(&position.symbol) else {
                continue;
            };
            if price <= 0.0 {
                continue;
            }

            let sell_value = remaining_excess.min(position.market_value_eur);
            let mut quantity = (sell_value / price) as u32;
            let after = position.quantity.saturating_sub(quantity);
            if after > 0 && after < security.min_lot {
                quantity = position.quantity - security.min_lot;
            }
            if quantity == 0 {
                continue;
            }
            let value_eur = quantity as f64 * price;
            if !config.is_trade_worthwhile(value_eur) {
                continue;
            }
            remaining_excess -= value_eur;

            candidates.push(ActionCandidate {
                side: TradeSide::Sell,
                symbol: position.symbol.clone(),
                name: security.name.clone(),
                quantity,
                price,
                value_eur,
                currency: position.currency.clone(),
                priority: drift * 100.0 * security.priority_multiplier,
                reason: format!(
                    "{} allocation {:.1}% above its {:.1}% target",
                    group,
                    current * 100.0,
                    target * 100.0
                ),
                tags: vec![tags::REBALANCE.to_string(), tags::overweight(group)],
            });
        }
    }

    candidates
}

/// Buy into country groups running below their target weight.
fn identify_rebalance_buys(
    inputs: &OpportunityInputs<'_>,
    config: &PlannerConfig,
) -> Vec<ActionCandidate> {
    let ctx = inputs.context;
    let mut candidates = Vec::new();
    let group_values = ctx.country_group_values();
    let base_trade = config.min_trade_amount();

    for (group, &target) in &ctx.country_weights {
        let current = group_values.get(group).copied().unwrap_or(0.0) / ctx.total_value;
        let gap = target - current;
        if gap <= REBALANCE_TOLERANCE {
            continue;
        }
        let gap_eur = gap * ctx.total_value;

        for security in inputs.securities {
            if !security.active
                || !security.allow_buy
                || inputs.cooldowns.recently_bought.contains(&security.symbol)
            {
                continue;
            }
            let in_group = security
                .country
                .as_ref()
                .and_then(|c| ctx.country_to_group.get(c))
                .is_some_and(|g| g == group);
            if !in_group {
                continue;
            }
            let Some(&price) = inputs.current_prices.get(&security.symbol) else {
                continue;
            };
            if price <= 0.0 {
                continue;
            }
            let quality = ctx.score_of(&security.symbol);
            if quality < MIN_STOCK_SCORE {
                continue;
            }

            let value_target = gap_eur.min(base_trade.max(gap_eur / 2.0));
            let quantity = ((value_target / price) as u32).max(security.min_lot);
            let value_eur = quantity as f64 * price;
            if !config.is_trade_worthwhile(value_eur) {
                continue;
            }

            candidates.push(ActionCandidate {
                side: TradeSide::Buy,
                symbol: security.symbol.clone(),
                name: security.name.clone(),
                quantity,
                price,
                value_eur,
                currency: security.currency.clone(),
                priority: gap * 100.0 * quality * security.priority_multiplier,
                reason: format!(
                    "{} allocation {:.1}% below its {:.1}% target",
                    group,
                    current * 100.0,
                    target * 100.0
                ),
                tags: vec![tags::REBALANCE.to_string(), tags::underweight(group)],
            });
        }
    }

    candidates
}

/// High-quality securities worth adding regardless of allocation drift.
fn identify_opportunity_buys(
    inputs: &OpportunityInputs<'_>,
    config: &PlannerConfig,
) -> Vec<ActionCandidate> {
    let ctx = inputs.context;
    let mut candidates = Vec::new();
    let base_trade = config.min_trade_amount();

    for security in inputs.securities {
        if !security.active
            || !security.allow_buy
            || inputs.cooldowns.recently_bought.contains(&security.symbol)
        {
            continue;
        }
        let quality = ctx.score_of(&security.symbol);
        if quality < OPPORTUNITY_MIN_QUALITY {
            continue;
        }
        // Already-concentrated holdings are handled by averaging-down instead.
        if ctx.weight_of(&security.symbol) >= CONCENTRATION_MED {
            continue;
        }
        let Some(&price) = inputs.current_prices.get(&security.symbol) else {
            continue;
        };
        if price <= 0.0 {
            continue;
        }

        let quantity = ((base_trade / price) as u32).max(security.min_lot);
        let value_eur = quantity as f64 * price;
        if !config.is_trade_worthwhile(value_eur) {
            continue;
        }

        candidates.push(ActionCandidate {
            side: TradeSide::Buy,
            symbol: security.symbol.clone(),
            name: security.name.clone(),
            quantity,
            price,
            value_eur,
            currency: security.currency.clone(),
            priority: quality * 100.0 * security.priority_multiplier,
            reason: format!("Quality score {quality:.2}"),
            tags: vec![tags::OPPORTUNITY.to_string(), tags::QUALITY.to_string()],
        });
    }

    candidates
}
