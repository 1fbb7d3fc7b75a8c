//! Core value types: actions, securities, positions, and plan output.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Tag vocabulary attached to [`ActionCandidate`]s.
///
/// Group-relative tags are produced dynamically via [`tags::overweight`] and
/// [`tags::underweight`].
pub mod tags {
    /// Position gained well beyond its historical growth rate.
    pub const WINDFALL: &str = "windfall";
    /// Trim a profitable position.
    pub const PROFIT_TAKING: &str = "profit_taking";
    /// Buy more of a held position trading below average cost.
    pub const AVERAGING_DOWN: &str = "averaging_down";
    /// Close a gap against target allocations.
    pub const REBALANCE: &str = "rebalance";
    /// Candidate derived from optimizer target weights.
    pub const OPTIMIZER_TARGET: &str = "optimizer_target";
    /// General buy-the-dip opportunity.
    pub const OPPORTUNITY: &str = "opportunity";
    /// High quality score drove this candidate.
    pub const QUALITY: &str = "quality";

    /// Tag for a sell that trims an overweight allocation group.
    pub fn overweight(group: &str) -> String {
        format!("overweight_{}", group.to_lowercase())
    }

    /// Tag for a buy that feeds an underweight allocation group.
    pub fn underweight(group: &str) -> String {
        format!("underweight_{}", group.to_lowercase())
    }
}

/// Direction of a trade action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    /// Purchase
    #[serde(rename = "BUY")]
    Buy,
    /// Disposal
    #[serde(rename = "SELL")]
    Sell,
}

impl TradeSide {
    /// Wire/database representation (`"BUY"` / `"SELL"`).
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate BUY or SELL not yet part of a committed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCandidate {
    /// BUY or SELL
    pub side: TradeSide,
    /// Ticker symbol
    pub symbol: String,
    /// Display name of the security
    pub name: String,
    /// Number of units traded (respects the security's `min_lot`)
    pub quantity: u32,
    /// Price per unit in the security's native currency
    pub price: f64,
    /// Total value of the action in EUR
    pub value_eur: f64,
    /// Native currency code
    pub currency: String,
    /// Non-negative importance; drives sort order and the priority threshold
    pub priority: f64,
    /// Short human-readable justification
    pub reason: String,
    /// Tags from the [`tags`] vocabulary
    pub tags: Vec<String>,
}

impl ActionCandidate {
    /// Whether this candidate carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// One-line summary for logging, e.g. `SELL 10 AAPL @ €200.00 = €2000`.
    pub fn summary(&self) -> String {
        format!(
            "{} {} {} @ €{:.2} = €{:.0}",
            self.side, self.quantity, self.symbol, self.price, self.value_eur
        )
    }
}

/// Per-symbol security metadata from the curated universe.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    /// Ticker symbol
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Country of listing/domicile
    pub country: Option<String>,
    /// Industry classification (comma-separated when multiple)
    pub industry: Option<String>,
    /// Native trading currency
    pub currency: String,
    /// Whether the planner may emit BUY actions for this symbol
    pub allow_buy: bool,
    /// Whether the planner may emit SELL actions for this symbol
    pub allow_sell: bool,
    /// Minimum tradable lot size
    pub min_lot: u32,
    /// Multiplier applied to heuristic priorities (1.0 = neutral)
    pub priority_multiplier: f64,
    /// Whether the security is active in the universe
    pub active: bool,
}

impl Security {
    /// Create a security with permissive defaults.
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            country: None,
            industry: None,
            currency: "EUR".to_string(),
            allow_buy: true,
            allow_sell: true,
            min_lot: 1,
            priority_multiplier: 1.0,
            active: true,
        }
    }

    /// Set the country.
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Set the industry.
    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }
}

/// A currently held position.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Ticker symbol
    pub symbol: String,
    /// Units held
    pub quantity: u32,
    /// Average purchase price in native currency
    pub avg_price: f64,
    /// Current market value in EUR
    pub market_value_eur: f64,
    /// Native currency code
    pub currency: String,
}

impl Position {
    /// Create a EUR-denominated position.
    pub fn new(
        symbol: impl Into<String>,
        quantity: u32,
        avg_price: f64,
        market_value_eur: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            avg_price,
            market_value_eur,
            currency: "EUR".to_string(),
        }
    }

    /// Set the native currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

/// An order placed but not yet filled; part of the portfolio fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    /// Ticker symbol
    pub symbol: String,
    /// BUY or SELL
    pub side: TradeSide,
    /// Units ordered
    pub quantity: u32,
}

/// Sets of symbols under trade cooldown.
///
/// A recently bought symbol is not bought again; a recently sold symbol is
/// not sold again. The opposite side remains allowed.
#[derive(Debug, Clone, Default)]
pub struct CooldownSets {
    /// Symbols bought within the buy cooldown window
    pub recently_bought: HashSet<String>,
    /// Symbols sold within the sell cooldown window
    pub recently_sold: HashSet<String>,
}

/// Categorized opportunities emitted by the identifier.
///
/// The five categories are closed; each list is sorted by descending
/// priority.
#[derive(Debug, Clone, Default)]
pub struct Opportunities {
    /// Windfall / profitable positions to trim
    pub profit_taking: Vec<ActionCandidate>,
    /// Quality dips among held positions
    pub averaging_down: Vec<ActionCandidate>,
    /// Overweight positions to reduce
    pub rebalance_sells: Vec<ActionCandidate>,
    /// Underweight areas to increase
    pub rebalance_buys: Vec<ActionCandidate>,
    /// High-quality securities at attractive prices
    pub opportunity_buys: Vec<ActionCandidate>,
}

impl Opportunities {
    /// True when no category holds any candidate.
    pub fn is_empty(&self) -> bool {
        self.profit_taking.is_empty()
            && self.averaging_down.is_empty()
            && self.rebalance_sells.is_empty()
            && self.rebalance_buys.is_empty()
            && self.opportunity_buys.is_empty()
    }

    /// Total number of candidates across all categories.
    pub fn len(&self) -> usize {
        self.profit_taking.len()
            + self.averaging_down.len()
            + self.rebalance_sells.len()
            + self.rebalance_buys.len()
            + self.opportunity_buys.len()
    }

    /// Sort every category by descending priority (stable).
    pub fn sort_by_priority(&mut self) {
        for list in [
            &mut self.profit_taking,
            &mut self.averaging_down,
            &mut self.rebalance_sells,
            &mut self.rebalance_buys,
            &mut self.opportunity_buys,
        ] {
            list.sort_by(|a, b| {
                b.priority
                    .partial_cmp(&a.priority)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }
}

/// A single step in a holistic plan.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolisticStep {
    /// 1-based position within the plan
    pub step_number: usize,
    /// BUY or SELL
    pub side: TradeSide,
    /// Ticker symbol
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Units traded
    pub quantity: u32,
    /// Estimated price per unit in native currency
    pub estimated_price: f64,
    /// Estimated action value in EUR
    pub estimated_value: f64,
    /// Native currency code
    pub currency: String,
    /// Short justification carried over from the candidate
    pub reason: String,
    /// Human-readable explanation of the step
    pub narrative: String,
    /// Step trims a windfall position
    pub is_windfall: bool,
    /// Step averages down a held position
    pub is_averaging_down: bool,
    /// Tags describing which goals the step addresses
    pub contributes_to: Vec<String>,
}

/// A complete holistic plan with end-state scoring.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolisticPlan {
    /// Ordered actions (sells first, then buys)
    pub steps: Vec<HolisticStep>,
    /// Current portfolio score (0–100)
    pub current_score: f64,
    /// Projected end-state score (0–100)
    pub end_state_score: f64,
    /// `end_state_score - current_score`
    pub improvement: f64,
    /// Plan-level narrative
    pub narrative_summary: String,
    /// Per-component subscores of the end state
    pub score_breakdown: std::collections::HashMap<String, f64>,
    /// Total EUR required for the BUY steps
    pub cash_required: f64,
    /// Total EUR freed by the SELL steps
    pub cash_generated: f64,
    /// Whether the plan is executable with available plus generated cash
    pub feasible: bool,
}

impl HolisticPlan {
    /// An empty plan that leaves the portfolio untouched.
    pub fn empty(current_score: f64, narrative: impl Into<String>, feasible: bool) -> Self {
        Self {
            steps: vec![],
            current_score,
            end_state_score: current_score,
            improvement: 0.0,
            narrative_summary: narrative.into(),
            score_breakdown: std::collections::HashMap::new(),
            cash_required: 0.0,
            cash_generated: 0.0,
            feasible,
        }
    }
}
