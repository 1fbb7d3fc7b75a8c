//! Planner configuration and builder.

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};

/// Configuration for holistic planning.
///
/// Use `PlannerConfig::builder()` to construct with the builder pattern.
///
/// # Example
///
/// ```
/// use holistic_planner::PlannerConfig;
///
/// let config = PlannerConfig::builder()
///     .max_plan_depth(4)
///     .beam_width(8)
///     .priority_threshold(0.5)
///     .enable_combinatorial(false)
///     .build()
///     .unwrap();
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Maximum sequence length (1..=depth actions per sequence)
    pub max_plan_depth: usize,

    /// Maximum candidates kept per opportunity category
    pub max_opportunities_per_category: usize,

    /// Enable combinatorial sequence enumeration in addition to the
    /// pattern templates
    pub enable_combinatorial: bool,

    /// Lower bound on the average per-action priority of a sequence
    pub priority_threshold: f64,

    /// Cap on combinatorially enumerated sequences per depth
    pub combinatorial_max_combinations_per_depth: usize,

    /// Maximum sells per combinatorial sequence
    pub combinatorial_max_sells: usize,

    /// Maximum buys per combinatorial sequence
    pub combinatorial_max_buys: usize,

    /// Candidate pool size fed into combinatorial enumeration
    pub combinatorial_max_candidates: usize,

    /// Use cluster-based diverse candidate selection instead of pure
    /// priority ranking
    pub enable_diverse_selection: bool,

    /// Diversity vs priority balance (0.0 = pure priority, 1.0 = pure
    /// diversity)
    pub diversity_weight: f64,

    /// Sequences processed per incremental-mode call
    pub batch_size: usize,

    /// Number of top sequences retained during batch-mode beam search (1–50)
    pub beam_width: usize,

    /// Fixed transaction cost per trade in EUR
    pub transaction_cost_fixed: f64,

    /// Variable transaction cost as a fraction of trade value
    pub transaction_cost_percent: f64,

    /// Days a bought symbol stays in buy cooldown
    pub buy_cooldown_days: u32,

    /// Days a sold symbol stays in sell cooldown
    pub sell_cooldown_days: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_plan_depth: 5,
            max_opportunities_per_category: 5,
            enable_combinatorial: true,
            priority_threshold: 0.3,
            combinatorial_max_combinations_per_depth: 50,
            combinatorial_max_sells: 4,
            combinatorial_max_buys: 4,
            combinatorial_max_candidates: 12,
            enable_diverse_selection: true,
            diversity_weight: 0.3,
            batch_size: 100,
            beam_width: 10,
            transaction_cost_fixed: 2.0,
            transaction_cost_percent: 0.002,
            buy_cooldown_days: 30,
            sell_cooldown_days: 180,
        }
    }
}

impl PlannerConfig {
    /// Start building a configuration from defaults.
    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::default()
    }

    /// Validate configuration constraints.
    pub fn validate(&self) -> Result<()> {
        if self.max_plan_depth == 0 {
            return Err(PlannerError::invalid_param(
                "max_plan_depth",
                "must be at least 1",
            ));
        }
        if self.max_opportunities_per_category == 0 {
            return Err(PlannerError::invalid_param(
                "max_opportunities_per_category",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.priority_threshold) {
            return Err(PlannerError::invalid_param(
                "priority_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.diversity_weight) {
            return Err(PlannerError::invalid_param(
                "diversity_weight",
                "must be between 0.0 and 1.0",
            ));
        }
        if !(1..=50).contains(&self.beam_width) {
            return Err(PlannerError::invalid_param(
                "beam_width",
                "must be between 1 and 50",
            ));
        }
        if self.batch_size == 0 {
            return Err(PlannerError::invalid_param(
                "batch_size",
                "must be at least 1",
            ));
        }
        if self.combinatorial_max_combinations_per_depth == 0
            || self.combinatorial_max_sells == 0
            || self.combinatorial_max_buys == 0
            || self.combinatorial_max_candidates == 0
        {
            return Err(PlannerError::invalid_param(
                "combinatorial limits",
                "must all be at least 1",
            ));
        }
        if self.transaction_cost_fixed < 0.0 {
            return Err(PlannerError::invalid_param(
                "transaction_cost_fixed",
                "must be non-negative",
            ));
        }
        if !(0.0..1.0).contains(&self.transaction_cost_percent) {
            return Err(PlannerError::invalid_param(
                "transaction_cost_percent",
                "must be a fraction below 1.0",
            ));
        }
        Ok(())
    }

    /// Smallest EUR trade whose value recovers its transaction cost twice
    /// over: `v >= 2 * (fixed + v * pct)`.
    pub fn min_trade_amount(&self) -> f64 {
        let denom = 1.0 - 2.0 * self.transaction_cost_percent;
        if denom <= 0.0 {
            return f64::MAX;
        }
        2.0 * self.transaction_cost_fixed / denom
    }

    /// Whether a trade of `value_eur` pays back at least twice its expected
    /// transaction cost.
    pub fn is_trade_worthwhile(&self, value_eur: f64) -> bool {
        let cost = self.transaction_cost_fixed + value_eur.abs() * self.transaction_cost_percent;
        value_eur.abs() >= cost * 2.0
    }
}

/// Builder for [`PlannerConfig`].
#[derive(Debug, Clone, Default)]
pub struct PlannerConfigBuilder {
    config: PlannerConfig,
}

macro_rules! builder_setter {
    ($(#[$doc:meta])* $name:ident: $ty:ty) => {
        $(#[$doc])*
        pub fn $name(mut self, value: $ty) -> Self {
            self.config.$name = value;
            self
        }
    };
}

impl PlannerConfigBuilder {
    builder_setter!(
        /// Cap on sequence length.
        max_plan_depth: usize
    );
    builder_setter!(
        /// Candidates kept per category.
        max_opportunities_per_category: usize
    );
    builder_setter!(
        /// Toggle combinatorial enumeration.
        enable_combinatorial: bool
    );
    builder_setter!(
        /// Average per-action priority floor.
        priority_threshold: f64
    );
    builder_setter!(
        /// Cap on combinations generated per depth.
        combinatorial_max_combinations_per_depth: usize
    );
    builder_setter!(
        /// Max sells per combination.
        combinatorial_max_sells: usize
    );
    builder_setter!(
        /// Max buys per combination.
        combinatorial_max_buys: usize
    );
    builder_setter!(
        /// Candidate pool size for combinations.
        combinatorial_max_candidates: usize
    );
    builder_setter!(
        /// Toggle diversity-aware selection.
        enable_diverse_selection: bool
    );
    builder_setter!(
        /// Diversity vs priority balance.
        diversity_weight: f64
    );
    builder_setter!(
        /// Incremental batch size.
        batch_size: usize
    );
    builder_setter!(
        /// Beam width for batch mode.
        beam_width: usize
    );
    builder_setter!(
        /// Fixed cost per trade (EUR).
        transaction_cost_fixed: f64
    );
    builder_setter!(
        /// Variable cost fraction per trade.
        transaction_cost_percent: f64
    );
    builder_setter!(
        /// Buy cooldown in days.
        buy_cooldown_days: u32
    );
    builder_setter!(
        /// Sell cooldown in days.
        sell_cooldown_days: u32
    );

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<PlannerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
