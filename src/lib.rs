//! # holistic-planner
//!
//! A holistic portfolio rebalancing planner. Given a snapshot of positions,
//! a curated security universe, and allocation targets, the planner produces
//! an ordered sequence of BUY/SELL actions that moves the portfolio toward
//! its geography/industry targets while improving a multi-factor quality
//! score.
//!
//! The planner evaluates action *sequences*, not individual trades: it
//! identifies opportunities, generates candidate sequences from ten pattern
//! templates plus bounded combinatorial enumeration, simulates each sequence
//! forward, scores the resulting end state, and returns the best plan. Work
//! can run in a single batch call or incrementally with durable progress.
//!
//! ## Features
//!
//! - Weight-driven (optimizer targets) and heuristic opportunity
//!   identification with trade cooldowns and transaction-cost filters
//! - Ten sequence pattern templates plus combinatorial enumeration, with
//!   diversity-aware candidate selection
//! - Pure, total-value-preserving sequence simulation
//! - End-state scoring: diversification, dividend, quality, and
//!   risk-adjusted (Sharpe/Sortino/drawdown/volatility) components
//! - Batch mode with beam search and early termination
//! - Incremental mode persisting sequences and evaluations in SQLite,
//!   resumable across restarts and invalidated on portfolio change
//! - Deterministic narratives explaining every step and the plan as a whole
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//! use holistic_planner::{
//!     AllocationTargets, CooldownSets, HolisticPlanner, PlanInputs, PlannerConfig,
//!     PortfolioContext, StaticMetrics,
//! };
//!
//! # async fn example(
//! #     positions: Vec<holistic_planner::Position>,
//! #     securities: Vec<holistic_planner::Security>,
//! #     prices: HashMap<String, f64>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let targets = AllocationTargets::default();
//! let context = PortfolioContext::from_universe(
//!     &positions, &securities, &targets,
//!     &HashMap::new(), &HashMap::new(), &prices, 1_000.0,
//! );
//!
//! let planner = HolisticPlanner::new(PlannerConfig::default(), StaticMetrics::default())?;
//! let cooldowns = CooldownSets::default();
//! let plan = planner
//!     .create_plan(&context, &PlanInputs {
//!         positions: &positions,
//!         securities: &securities,
//!         available_cash: 1_000.0,
//!         current_prices: &prices,
//!         target_weights: None,
//!         cooldowns: &cooldowns,
//!         cash_balances: &[("EUR".to_string(), 1_000.0)],
//!         pending_orders: &[],
//!     })
//!     .await?;
//!
//! println!("{}", plan.narrative_summary);
//! for step in &plan.steps {
//!     println!("{}. {} {} {}", step.step_number, step.side, step.quantity, step.symbol);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Incremental mode
//!
//! ```no_run
//! # use holistic_planner::{HolisticPlanner, PlannerConfig, SqlitePlannerStore, StaticMetrics};
//! # async fn example(
//! #     planner: HolisticPlanner<StaticMetrics>,
//! #     context: holistic_planner::PortfolioContext,
//! #     inputs: holistic_planner::PlanInputs<'_>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqlitePlannerStore::open("planner.db")?;
//! // Each call evaluates one batch and returns the best plan found so far.
//! while let Some(plan) = planner.create_plan_incremental(&context, &inputs, &store).await? {
//!     if plan.improvement > 5.0 {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Planner configuration and builder
pub mod config;
/// Scoring constants
pub mod constants;
/// Immutable portfolio snapshot
pub mod context;
/// Error types and result definitions
pub mod error;
/// Portfolio and sequence fingerprints
pub mod hash;
/// Per-symbol metric access
pub mod metrics;
/// Core value types
pub mod models;
/// Step and plan narratives
pub mod narrative;
/// Opportunity identification
pub mod opportunities;
/// Orchestration: batch and incremental planning
pub mod planner;
/// Portfolio and end-state scoring
pub mod scoring;
/// Candidate sequence generation
pub mod sequences;
/// Pure sequence simulation
pub mod simulate;
/// Durable planner state
pub mod store;

// Re-export main types
pub use config::{PlannerConfig, PlannerConfigBuilder};
pub use context::{AllocationTargets, GroupTarget, PortfolioContext};
pub use error::{PlannerError, Result};
pub use hash::{portfolio_hash, sequence_hash};
pub use metrics::{MetricsProvider, StaticMetrics, SymbolMetrics};
pub use models::{
    ActionCandidate, CooldownSets, HolisticPlan, HolisticStep, Opportunities, PendingOrder,
    Position, Security, TradeSide,
};
pub use planner::{FilterCounts, HolisticPlanner, PlanInputs, filter_feasible};
pub use scoring::{PortfolioScore, portfolio_score, score_end_state};
pub use sequences::{GeneratedSequence, PatternKind, generate_action_sequences};
pub use simulate::simulate_sequence;
pub use store::{BestResult, PlannerStore, SqlitePlannerStore, StoredEvaluation, StoredSequence};
