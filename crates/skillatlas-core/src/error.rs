//! Engine error types.
//!
//! These are configuration and content errors: they are raised once, when a
//! node, key, or config is constructed, and never during scoring math. Numeric
//! drift is clamped rather than reported.

use thiserror::Error;

/// Errors raised by the engine for invalid configuration or content.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// An engagement event type outside the allow-list.
    #[error("invalid engagement event type: {0}")]
    InvalidEventType(String),

    /// A chapter key that does not match `<subject>_<slug>`.
    #[error("invalid chapter key '{key}': {reason}")]
    InvalidChapterKey { key: String, reason: String },

    /// A subject key outside {physics, chemistry, mathematics}.
    #[error("unknown subject: {0}")]
    UnknownSubject(String),

    /// A single scoring weight is non-finite or outside [0, 1].
    #[error("invalid scoring weight {field} = {value}")]
    InvalidWeight { field: &'static str, value: f64 },

    /// The scoring weights of a node do not sum to 1.0.
    #[error("scoring weights must sum to 1.0, got {sum:.4}")]
    WeightsDoNotSumToOne { sum: f64 },

    /// A node threshold is non-finite, out of range, or inconsistent.
    #[error("invalid threshold {field} = {value}: {reason}")]
    InvalidThreshold {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// A curriculum chapter weight that is not strictly positive.
    #[error("invalid chapter weight for {chapter}: {value}")]
    InvalidChapterWeight { chapter: String, value: f64 },

    /// A retrieval quiz reported more correct answers than questions.
    #[error("retrieval correct ({correct}) cannot exceed total ({total})")]
    InvalidRetrievalCount { correct: u32, total: u32 },

    /// An engine configuration value is out of range.
    #[error("invalid config {field}: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },
}

/// Errors surfaced by a storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The compare-and-swap lost to a concurrent writer more times than allowed.
    #[error("write conflict on {key} after {attempts} attempts")]
    ConflictRetriesExhausted { key: String, attempts: u32 },

    /// The backing store failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` if retrying the whole operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::ConflictRetriesExhausted { .. })
    }
}
