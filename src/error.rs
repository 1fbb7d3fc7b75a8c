//! Error types for planner operations.

use thiserror::Error;

/// Planner-specific errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlannerError {
    /// Invalid configuration parameter
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Parameter name
        param: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Persistence layer failure
    #[error("Store error: {0}")]
    Store(String),

    /// SQLite failure in the bundled store implementation
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization of a persisted entity failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metrics provider failure
    #[error("Metrics error: {0}")]
    Metrics(String),
}

/// Result type for planner operations
pub type Result<T> = std::result::Result<T, PlannerError>;

impl PlannerError {
    /// Create an invalid parameter error
    pub fn invalid_param(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a metrics error
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }
}
