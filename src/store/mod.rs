//! Durable planner state: sequences, evaluations, and the best result.
//!
//! The planner never reaches into process-global state; it receives a
//! [`PlannerStore`] and performs all persistence through it. Operations are
//! idempotent per `(sequence_hash, portfolio_hash)` so interrupted batches
//! can always be retried.

mod sqlite;

pub use sqlite::SqlitePlannerStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::ActionCandidate;
use crate::sequences::GeneratedSequence;

/// A persisted candidate sequence.
#[derive(Debug, Clone)]
pub struct StoredSequence {
    /// Fingerprint of the action tuples
    pub sequence_hash: String,
    /// Fingerprint of the portfolio this sequence was generated for
    pub portfolio_hash: String,
    /// Sum of action priorities (evaluation order key)
    pub priority: f64,
    /// The actions themselves
    pub actions: Vec<ActionCandidate>,
    /// Sequence length at generation time
    pub depth: usize,
    /// Pattern that produced the sequence
    pub pattern_type: String,
    /// Whether the sequence has been evaluated
    pub completed: bool,
    /// When the sequence was evaluated
    pub evaluated_at: Option<DateTime<Utc>>,
    /// When the sequence was persisted
    pub created_at: DateTime<Utc>,
}

/// A persisted evaluation result.
#[derive(Debug, Clone)]
pub struct StoredEvaluation {
    /// Fingerprint of the evaluated sequence
    pub sequence_hash: String,
    /// Fingerprint of the portfolio
    pub portfolio_hash: String,
    /// End-state score in [0,1]
    pub end_score: f64,
    /// Per-component subscores
    pub breakdown: HashMap<String, f64>,
    /// Cash remaining after the sequence
    pub end_cash: f64,
    /// End-state positions (symbol → EUR value)
    pub end_positions: HashMap<String, f64>,
    /// Diversification score of the end state (0–100)
    pub div_score: f64,
    /// Total portfolio value after the sequence
    pub total_value: f64,
    /// When the evaluation ran
    pub evaluated_at: DateTime<Utc>,
}

/// The best sequence found so far for one portfolio fingerprint.
#[derive(Debug, Clone)]
pub struct BestResult {
    /// Portfolio fingerprint
    pub portfolio_hash: String,
    /// Fingerprint of the winning sequence
    pub best_sequence_hash: String,
    /// Its end-state score
    pub best_score: f64,
    /// Last time the record was replaced
    pub updated_at: DateTime<Utc>,
}

/// Persistence operations required by the incremental planner.
#[async_trait]
pub trait PlannerStore: Send + Sync {
    /// Bulk insert-or-ignore generated sequences. Safe to call repeatedly;
    /// returns the number of newly inserted rows.
    async fn ensure_sequences_generated(
        &self,
        portfolio_hash: &str,
        sequences: &[GeneratedSequence],
    ) -> Result<usize>;

    /// Whether any sequences exist for this portfolio.
    async fn has_sequences(&self, portfolio_hash: &str) -> Result<bool>;

    /// Next uncompleted sequences, highest priority first.
    async fn get_next_sequences(
        &self,
        portfolio_hash: &str,
        limit: usize,
    ) -> Result<Vec<StoredSequence>>;

    /// Load one sequence by its hash.
    async fn get_sequence(
        &self,
        portfolio_hash: &str,
        sequence_hash: &str,
    ) -> Result<Option<StoredSequence>>;

    /// Whether an evaluation exists for this sequence/portfolio pair.
    async fn has_evaluation(&self, sequence_hash: &str, portfolio_hash: &str) -> Result<bool>;

    /// Load one evaluation.
    async fn get_evaluation(
        &self,
        sequence_hash: &str,
        portfolio_hash: &str,
    ) -> Result<Option<StoredEvaluation>>;

    /// Insert-or-replace an evaluation.
    async fn insert_evaluation(&self, evaluation: &StoredEvaluation) -> Result<()>;

    /// Mark a sequence as evaluated.
    async fn mark_sequence_completed(
        &self,
        sequence_hash: &str,
        portfolio_hash: &str,
        evaluated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Current best result for a portfolio, if any.
    async fn get_best_result(&self, portfolio_hash: &str) -> Result<Option<BestResult>>;

    /// Replace the best result only when `score` strictly exceeds the stored
    /// best (or no record exists). Returns whether the record changed.
    async fn update_best_result(
        &self,
        portfolio_hash: &str,
        sequence_hash: &str,
        score: f64,
    ) -> Result<bool>;

    /// All distinct portfolio hashes present in the sequences table.
    async fn list_portfolio_hashes(&self) -> Result<Vec<String>>;

    /// Delete all rows for a portfolio from all three tables.
    async fn delete_sequences_for_portfolio(&self, portfolio_hash: &str) -> Result<()>;
}
