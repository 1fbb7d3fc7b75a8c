//! SQLite-backed planner store.
//!
//! Three tables keyed by `(sequence_hash, portfolio_hash)` (the best-result
//! table by `portfolio_hash` alone). Every operation runs in a short
//! transaction; a failed batch loses nothing because each evaluation commits
//! independently.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::{PlannerError, Result};
use crate::models::ActionCandidate;
use crate::sequences::GeneratedSequence;

use super::{BestResult, PlannerStore, StoredEvaluation, StoredSequence};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sequences (
    sequence_hash TEXT NOT NULL,
    portfolio_hash TEXT NOT NULL,
    priority REAL NOT NULL,
    sequence_json TEXT NOT NULL,
    depth INTEGER NOT NULL,
    pattern_type TEXT,
    completed INTEGER NOT NULL DEFAULT 0,
    evaluated_at TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (sequence_hash, portfolio_hash)
);

CREATE INDEX IF NOT EXISTS idx_sequences_portfolio ON sequences(portfolio_hash);
CREATE INDEX IF NOT EXISTS idx_sequences_priority
    ON sequences(portfolio_hash, priority DESC, completed);
CREATE INDEX IF NOT EXISTS idx_sequences_completed
    ON sequences(portfolio_hash, completed);

CREATE TABLE IF NOT EXISTS evaluations (
    sequence_hash TEXT NOT NULL,
    portfolio_hash TEXT NOT NULL,
    end_score REAL NOT NULL,
    breakdown_json TEXT NOT NULL,
    end_cash REAL NOT NULL,
    end_positions_json TEXT NOT NULL,
    div_score REAL NOT NULL,
    total_value REAL NOT NULL,
    evaluated_at TEXT NOT NULL,
    PRIMARY KEY (sequence_hash, portfolio_hash)
);

CREATE INDEX IF NOT EXISTS idx_evaluations_portfolio ON evaluations(portfolio_hash);
CREATE INDEX IF NOT EXISTS idx_evaluations_score
    ON evaluations(portfolio_hash, end_score DESC);

CREATE TABLE IF NOT EXISTS best_result (
    portfolio_hash TEXT PRIMARY KEY,
    best_sequence_hash TEXT NOT NULL,
    best_score REAL NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Planner store backed by a single SQLite database.
pub struct SqlitePlannerStore {
    conn: Mutex<Connection>,
}

impl SqlitePlannerStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store, useful for tests.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PlannerError::store("planner store mutex poisoned"))
    }
}

fn row_to_sequence(row: &rusqlite::Row<'_>) -> rusqlite::Result<(StoredSequence, String)> {
    let sequence_json: String = row.get(3)?;
    let evaluated_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok((
        StoredSequence {
            sequence_hash: row.get(0)?,
            portfolio_hash: row.get(1)?,
            priority: row.get(2)?,
            actions: vec![],
            depth: row.get::<_, i64>(4)? as usize,
            pattern_type: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            completed: row.get::<_, i64>(6)? == 1,
            evaluated_at: evaluated_at.and_then(|s| parse_timestamp(&s)),
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        },
        sequence_json,
    ))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[async_trait]
impl PlannerStore for SqlitePlannerStore {
    async fn ensure_sequences_generated(
        &self,
        portfolio_hash: &str,
        sequences: &[GeneratedSequence],
    ) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO sequences
                 (sequence_hash, portfolio_hash, priority, sequence_json, depth,
                  pattern_type, completed, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
            )?;
            for sequence in sequences {
                let sequence_json = serde_json::to_string(&sequence.actions)?;
                inserted += stmt.execute(params![
                    sequence.hash(),
                    portfolio_hash,
                    sequence.priority(),
                    sequence_json,
                    sequence.depth() as i64,
                    sequence.pattern.as_str(),
                    now,
                ])?;
            }
        }
        tx.commit()?;
        debug!(portfolio = %&portfolio_hash[..8.min(portfolio_hash.len())], inserted, "sequences persisted");
        Ok(inserted)
    }

    async fn has_sequences(&self, portfolio_hash: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sequences WHERE portfolio_hash = ?",
            params![portfolio_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn get_next_sequences(
        &self,
        portfolio_hash: &str,
        limit: usize,
    ) -> Result<Vec<StoredSequence>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT sequence_hash, portfolio_hash, priority, sequence_json, depth,
                    pattern_type, completed, evaluated_at, created_at
             FROM sequences
             WHERE portfolio_hash = ? AND completed = 0
             ORDER BY priority DESC, sequence_hash ASC
             LIMIT ?",
        )?;
        let rows = stmt
            .query_map(params![portfolio_hash, limit as i64], row_to_sequence)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut sequences = Vec::with_capacity(rows.len());
        for (mut stored, sequence_json) in rows {
            stored.actions = serde_json::from_str::<Vec<ActionCandidate>>(&sequence_json)?;
            sequences.push(stored);
        }
        Ok(sequences)
    }

    async fn get_sequence(
        &self,
        portfolio_hash: &str,
        sequence_hash: &str,
    ) -> Result<Option<StoredSequence>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT sequence_hash, portfolio_hash, priority, sequence_json, depth,
                        pattern_type, completed, evaluated_at, created_at
                 FROM sequences
                 WHERE portfolio_hash = ? AND sequence_hash = ?",
                params![portfolio_hash, sequence_hash],
                row_to_sequence,
            )
            .optional()?;
        match row {
            Some((mut stored, sequence_json)) => {
                stored.actions = serde_json::from_str::<Vec<ActionCandidate>>(&sequence_json)?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    async fn has_evaluation(&self, sequence_hash: &str, portfolio_hash: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM evaluations WHERE sequence_hash = ? AND portfolio_hash = ?",
            params![sequence_hash, portfolio_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn get_evaluation(
        &self,
        sequence_hash: &str,
        portfolio_hash: &str,
    ) -> Result<Option<StoredEvaluation>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT sequence_hash, portfolio_hash, end_score, breakdown_json, end_cash,
                        end_positions_json, div_score, total_value, evaluated_at
                 FROM evaluations
                 WHERE sequence_hash = ? AND portfolio_hash = ?",
                params![sequence_hash, portfolio_hash],
                |row| {
                    let breakdown_json: String = row.get(3)?;
                    let positions_json: String = row.get(5)?;
                    let evaluated_at: String = row.get(8)?;
                    Ok((
                        StoredEvaluation {
                            sequence_hash: row.get(0)?,
                            portfolio_hash: row.get(1)?,
                            end_score: row.get(2)?,
                            breakdown: HashMap::new(),
                            end_cash: row.get(4)?,
                            end_positions: HashMap::new(),
                            div_score: row.get(6)?,
                            total_value: row.get(7)?,
                            evaluated_at: parse_timestamp(&evaluated_at)
                                .unwrap_or_else(Utc::now),
                        },
                        breakdown_json,
                        positions_json,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((mut evaluation, breakdown_json, positions_json)) => {
                evaluation.breakdown = serde_json::from_str(&breakdown_json)?;
                evaluation.end_positions = serde_json::from_str(&positions_json)?;
                Ok(Some(evaluation))
            }
            None => Ok(None),
        }
    }

    async fn insert_evaluation(&self, evaluation: &StoredEvaluation) -> Result<()> {
        let breakdown_json = serde_json::to_string(&evaluation.breakdown)?;
        let positions_json = serde_json::to_string(&evaluation.end_positions)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO evaluations
             (sequence_hash, portfolio_hash, end_score, breakdown_json, end_cash,
              end_positions_json, div_score, total_value, evaluated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                evaluation.sequence_hash,
                evaluation.portfolio_hash,
                evaluation.end_score,
                breakdown_json,
                evaluation.end_cash,
                positions_json,
                evaluation.div_score,
                evaluation.total_value,
                evaluation.evaluated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn mark_sequence_completed(
        &self,
        sequence_hash: &str,
        portfolio_hash: &str,
        evaluated_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE sequences SET completed = 1, evaluated_at = ?
             WHERE sequence_hash = ? AND portfolio_hash = ?",
            params![evaluated_at.to_rfc3339(), sequence_hash, portfolio_hash],
        )?;
        Ok(())
    }

    async fn get_best_result(&self, portfolio_hash: &str) -> Result<Option<BestResult>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT portfolio_hash, best_sequence_hash, best_score, updated_at
                 FROM best_result WHERE portfolio_hash = ?",
                params![portfolio_hash],
                |row| {
                    let updated_at: String = row.get(3)?;
                    Ok(BestResult {
                        portfolio_hash: row.get(0)?,
                        best_sequence_hash: row.get(1)?,
                        best_score: row.get(2)?,
                        updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    async fn update_best_result(
        &self,
        portfolio_hash: &str,
        sequence_hash: &str,
        score: f64,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT INTO best_result (portfolio_hash, best_sequence_hash, best_score, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(portfolio_hash) DO UPDATE SET
                 best_sequence_hash = excluded.best_sequence_hash,
                 best_score = excluded.best_score,
                 updated_at = excluded.updated_at
             WHERE excluded.best_score > best_result.best_score",
            params![
                portfolio_hash,
                sequence_hash,
                score,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(changed > 0)
    }

    async fn list_portfolio_hashes(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT portfolio_hash FROM sequences")?;
        let hashes = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(hashes)
    }

    async fn delete_sequences_for_portfolio(&self, portfolio_hash: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM sequences WHERE portfolio_hash = ?",
            params![portfolio_hash],
        )?;
        tx.execute(
            "DELETE FROM evaluations WHERE portfolio_hash = ?",
            params![portfolio_hash],
        )?;
        tx.execute(
            "DELETE FROM best_result WHERE portfolio_hash = ?",
            params![portfolio_hash],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TradeSide, tags};
    use crate::sequences::PatternKind;

    fn sample_sequence(symbol: &str, priority: f64) -> GeneratedSequence {
        GeneratedSequence {
            actions: vec![ActionCandidate {
                side: TradeSide::Sell,
                symbol: symbol.to_string(),
                name: symbol.to_string(),
                quantity: 5,
                price: 100.0,
                value_eur: 500.0,
                currency: "EUR".to_string(),
                priority,
                reason: "test".to_string(),
                tags: vec![tags::PROFIT_TAKING.to_string()],
            }],
            pattern: PatternKind::SingleBest,
        }
    }

    fn sample_evaluation(sequence_hash: &str, portfolio_hash: &str, score: f64) -> StoredEvaluation {
        StoredEvaluation {
            sequence_hash: sequence_hash.to_string(),
            portfolio_hash: portfolio_hash.to_string(),
            end_score: score,
            breakdown: HashMap::from([("diversification".to_string(), score)]),
            end_cash: 500.0,
            end_positions: HashMap::from([("AAPL".to_string(), 1_000.0)]),
            div_score: 60.0,
            total_value: 1_500.0,
            evaluated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = SqlitePlannerStore::in_memory().unwrap();
        let sequences = vec![sample_sequence("AAPL", 5.0), sample_sequence("MSFT", 3.0)];
        let first = store.ensure_sequences_generated("pf1", &sequences).await.unwrap();
        assert_eq!(first, 2);
        let second = store.ensure_sequences_generated("pf1", &sequences).await.unwrap();
        assert_eq!(second, 0);
        assert!(store.has_sequences("pf1").await.unwrap());
        assert!(!store.has_sequences("pf2").await.unwrap());
    }

    #[tokio::test]
    async fn test_next_sequences_priority_order() {
        let store = SqlitePlannerStore::in_memory().unwrap();
        let sequences = vec![
            sample_sequence("LOW", 1.0),
            sample_sequence("HIGH", 9.0),
            sample_sequence("MID", 5.0),
        ];
        store.ensure_sequences_generated("pf1", &sequences).await.unwrap();

        let next = store.get_next_sequences("pf1", 2).await.unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].actions[0].symbol, "HIGH");
        assert_eq!(next[1].actions[0].symbol, "MID");
        assert!(!next[0].completed);

        // Completing one removes it from the queue.
        store
            .mark_sequence_completed(&next[0].sequence_hash, "pf1", Utc::now())
            .await
            .unwrap();
        let remaining = store.get_next_sequences("pf1", 10).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|s| s.actions[0].symbol != "HIGH"));
    }

    #[tokio::test]
    async fn test_sequence_round_trip_preserves_actions() {
        let store = SqlitePlannerStore::in_memory().unwrap();
        let sequence = sample_sequence("AAPL", 5.0);
        let hash = sequence.hash();
        store.ensure_sequences_generated("pf1", &[sequence.clone()]).await.unwrap();

        let loaded = store.get_sequence("pf1", &hash).await.unwrap().unwrap();
        assert_eq!(loaded.actions.len(), 1);
        assert_eq!(loaded.actions[0].symbol, "AAPL");
        assert_eq!(loaded.actions[0].side, TradeSide::Sell);
        assert_eq!(loaded.actions[0].quantity, 5);
        assert_eq!(loaded.pattern_type, "single_best");
        assert_eq!(loaded.depth, 1);
    }

    #[tokio::test]
    async fn test_evaluation_round_trip() {
        let store = SqlitePlannerStore::in_memory().unwrap();
        let evaluation = sample_evaluation("seq1", "pf1", 0.72);
        store.insert_evaluation(&evaluation).await.unwrap();

        assert!(store.has_evaluation("seq1", "pf1").await.unwrap());
        assert!(!store.has_evaluation("seq1", "pf2").await.unwrap());

        let loaded = store.get_evaluation("seq1", "pf1").await.unwrap().unwrap();
        assert!((loaded.end_score - 0.72).abs() < 1e-12);
        assert!((loaded.breakdown["diversification"] - 0.72).abs() < 1e-12);
        assert!((loaded.end_positions["AAPL"] - 1_000.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_best_result_is_monotone() {
        let store = SqlitePlannerStore::in_memory().unwrap();
        assert!(store.update_best_result("pf1", "seq1", 0.5).await.unwrap());
        // Lower score never replaces.
        assert!(!store.update_best_result("pf1", "seq2", 0.4).await.unwrap());
        let best = store.get_best_result("pf1").await.unwrap().unwrap();
        assert_eq!(best.best_sequence_hash, "seq1");
        // Strictly higher score does.
        assert!(store.update_best_result("pf1", "seq3", 0.6).await.unwrap());
        let best = store.get_best_result("pf1").await.unwrap().unwrap();
        assert_eq!(best.best_sequence_hash, "seq3");
        assert!((best.best_score - 0.6).abs() < 1e-12);
        // Equal score is not an improvement.
        assert!(!store.update_best_result("pf1", "seq4", 0.6).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades_all_tables() {
        let store = SqlitePlannerStore::in_memory().unwrap();
        let sequence = sample_sequence("AAPL", 5.0);
        let hash = sequence.hash();
        store.ensure_sequences_generated("pf1", &[sequence]).await.unwrap();
        store
            .insert_evaluation(&sample_evaluation(&hash, "pf1", 0.8))
            .await
            .unwrap();
        store.update_best_result("pf1", &hash, 0.8).await.unwrap();

        store.delete_sequences_for_portfolio("pf1").await.unwrap();
        assert!(!store.has_sequences("pf1").await.unwrap());
        assert!(!store.has_evaluation(&hash, "pf1").await.unwrap());
        assert!(store.get_best_result("pf1").await.unwrap().is_none());
        assert!(store.list_portfolio_hashes().await.unwrap().is_empty());
    }
}
