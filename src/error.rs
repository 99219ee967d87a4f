// ⚠️ Errors - typed failures of the resolution engine and the ramp applier
//
// Unresolvable keys and empty category intersections are NOT errors; they
// simply produce no entries. Everything here is a contract violation.

use thiserror::Error;

/// Result type used across the library
pub type Result<T> = std::result::Result<T, TransformError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// Per-category mapping supplied under a key that is not a single leaf
    /// resolving to exactly one variable
    #[error("per-category magnitude under key '{key}' is not allowed: {reason}")]
    PerCategoryMagnitude { key: String, reason: String },

    #[error("per-category magnitude under key '{key}' names category '{category}', which variable '{variable}' does not declare")]
    UnknownCategoryInMagnitude {
        key: String,
        variable: String,
        category: String,
    },

    #[error("invalid magnitude {value} under key '{key}'")]
    InvalidMagnitude { key: String, value: f64 },

    #[error("invalid bounds [{lower}, {upper:?}]")]
    InvalidBounds { lower: f64, upper: Option<f64> },

    #[error("invalid ramp vector: {reason}")]
    InvalidRamp { reason: String },

    #[error("column '{column}' not found in table")]
    MissingColumn { column: String },

    #[error("column '{column}' appears twice")]
    DuplicateColumn { column: String },

    #[error("column '{column}' has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("column '{column}' has {found} rows, table has {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },

    /// Entry planned against a different baseline than the one being applied
    #[error("entry for '{variable}' was planned from baseline {found}, applying from {expected}")]
    BaselineMismatch {
        variable: String,
        expected: i64,
        found: i64,
    },

    #[error("failed to serialize plan: {reason}")]
    Serialization { reason: String },

    #[error("invalid taxonomy: {reason}")]
    Taxonomy { reason: String },
}

impl TransformError {
    pub fn taxonomy(reason: impl Into<String>) -> Self {
        TransformError::Taxonomy {
            reason: reason.into(),
        }
    }

    pub fn ramp(reason: impl Into<String>) -> Self {
        TransformError::InvalidRamp {
            reason: reason.into(),
        }
    }
}
