//! Scoring constants shared across the planner.
//!
//! These are deliberately not part of [`PlannerConfig`](crate::config::PlannerConfig):
//! they tune the scoring model itself rather than the search, and changing them
//! invalidates comparability of stored evaluation scores.

// ── End-state score weights (sum to 1.0) ─────────────────────────────────────

/// Weight of the diversification component in the end-state score.
pub const END_STATE_WEIGHT_DIVERSIFICATION: f64 = 0.40;
/// Weight of the portfolio dividend component.
pub const END_STATE_WEIGHT_DIVIDEND: f64 = 0.15;
/// Weight of the portfolio quality component.
pub const END_STATE_WEIGHT_QUALITY: f64 = 0.20;
/// Weight of the normalized Sharpe component.
pub const END_STATE_WEIGHT_SHARPE: f64 = 0.08;
/// Weight of the normalized Sortino component.
pub const END_STATE_WEIGHT_SORTINO: f64 = 0.07;
/// Weight of the drawdown resilience component.
pub const END_STATE_WEIGHT_DRAWDOWN: f64 = 0.05;
/// Weight of the volatility component.
pub const END_STATE_WEIGHT_VOLATILITY: f64 = 0.05;

// ── Risk metric normalization caps ───────────────────────────────────────────

/// Sharpe ratio mapping to [0,1]: `clamp(sharpe / SHARPE_CAP, 0, 1)`.
pub const SHARPE_CAP: f64 = 3.0;
/// Sortino ratio mapping to [0,1]: `clamp(sortino / SORTINO_CAP, 0, 1)`.
pub const SORTINO_CAP: f64 = 4.0;
/// Annualized volatility above this level scores 0.
pub const VOLATILITY_CAP: f64 = 0.60;

// ── Diversification score internals ──────────────────────────────────────────

/// Weight of the geography gap inside the diversification score.
pub const DIVERSIFICATION_WEIGHT_GEOGRAPHY: f64 = 0.40;
/// Weight of the industry gap inside the diversification score.
pub const DIVERSIFICATION_WEIGHT_INDUSTRY: f64 = 0.30;
/// Weight of the averaging-down bonus inside the diversification score.
pub const DIVERSIFICATION_WEIGHT_AVERAGING: f64 = 0.30;

/// Average allocation deviation at which the gap score bottoms out at 0.
pub const GAP_DEVIATION_FLOOR: f64 = 0.30;

/// Maximum cost-basis bonus added to the averaging-down score of a held
/// position trading below its average cost.
pub const MAX_COST_BASIS_BOOST: f64 = 0.15;
/// Losses deeper than this fraction no longer qualify for the cost-basis
/// bonus (falling knives are not averaging-down candidates).
pub const COST_BASIS_BOOST_THRESHOLD: f64 = 0.30;

/// Position share of total value above which the averaging-down score is
/// damped hard (×0.7).
pub const CONCENTRATION_HIGH: f64 = 0.15;
/// Position share above which the averaging-down score is damped (×0.9).
pub const CONCENTRATION_MED: f64 = 0.10;

// ── Current-portfolio score weights (0–100 scale, sum to 1.0) ────────────────

/// Weight of diversification in the current portfolio score.
pub const PORTFOLIO_WEIGHT_DIVERSIFICATION: f64 = 0.40;
/// Weight of the dividend component in the current portfolio score.
pub const PORTFOLIO_WEIGHT_DIVIDEND: f64 = 0.30;
/// Weight of the quality component in the current portfolio score.
pub const PORTFOLIO_WEIGHT_QUALITY: f64 = 0.30;

// ── Heuristic opportunity thresholds ─────────────────────────────────────────

/// Minimum unrealized gain before a position is a profit-taking candidate.
pub const PROFIT_TAKING_MIN_GAIN: f64 = 0.25;
/// Fraction of a profit-taking position that is trimmed.
pub const PROFIT_TAKING_FRACTION: f64 = 0.25;
/// Margin over CAGR-implied growth beyond which a gain counts as a windfall.
pub const WINDFALL_MARGIN: f64 = 0.20;
/// Holding horizon (years) used to project CAGR-implied growth for windfall
/// detection.
pub const WINDFALL_HORIZON_YEARS: f64 = 3.0;
/// Expected annual growth assumed when a symbol has no CAGR metric.
pub const DEFAULT_EXPECTED_CAGR: f64 = 0.08;
/// Minimum dip below average cost before averaging down is considered.
pub const AVERAGING_DOWN_MIN_DIP: f64 = 0.05;
/// Quality score floor for any heuristic buy candidate.
pub const MIN_STOCK_SCORE: f64 = 0.60;
/// Quality score floor for general opportunity buys.
pub const OPPORTUNITY_MIN_QUALITY: f64 = 0.70;
/// Group allocation drift tolerated before rebalance candidates are emitted.
pub const REBALANCE_TOLERANCE: f64 = 0.05;

/// Default quality score for symbols without one.
pub const DEFAULT_STOCK_SCORE: f64 = 0.5;
/// Group name used when a country or industry maps to no configured group.
pub const OTHER_GROUP: &str = "OTHER";

// ── Search internals ─────────────────────────────────────────────────────────

/// Sequences evaluated concurrently per batch in batch mode.
pub const EVAL_BATCH_SIZE: usize = 5;
/// Consecutive non-improving sequences before batch mode terminates early.
pub const PLATEAU_THRESHOLD: usize = 5;
/// Minimum number of sequences evaluated before early termination may fire.
pub const MIN_SEQUENCES_TO_EVALUATE: usize = 10;
/// Weight gaps smaller than this fraction are ignored entirely.
pub const MIN_WEIGHT_GAP: f64 = 0.005;
