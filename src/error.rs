//! Error types for the co-occurrence pipeline.
//!
//! Every stage returns [`Result<T>`]. Errors fall into three groups:
//!
//! | Group | Variants |
//! |-------|----------|
//! | Input validation | `InvalidConfig`, `LengthMismatch` |
//! | Data integrity | `NonPositiveLogInput`, `FactorOutOfRange`, `InvalidWeight`, `MissingEmbedding`, `ZeroNorm` |
//! | Boundary | `Json`, `Io` |
//!
//! An empty result (no valid items or groups) is not an error; see
//! [`crate::engine::PmiOutcome`].

use thiserror::Error;

/// Errors produced while computing co-occurrence scores or similarities.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("length mismatch: {left} has {left_len} entries but {right} has {right_len}")]
    LengthMismatch {
        left: &'static str,
        left_len: usize,
        right: &'static str,
        right_len: usize,
    },

    /// A log2 input was zero or negative. Frequencies and counts are positive by
    /// construction, so this means the pair table is inconsistent.
    #[error(
        "non-positive log2 input for pair ({item1}, {item2}): cooc={cooc}, freq1={freq1}, freq2={freq2}, total={total}"
    )]
    NonPositiveLogInput {
        item1: String,
        item2: String,
        cooc: u64,
        freq1: u64,
        freq2: u64,
        total: u64,
    },

    #[error("factor index {factor} for '{feature}' is outside 1..={dimensions}")]
    FactorOutOfRange {
        feature: String,
        factor: u32,
        dimensions: usize,
    },

    #[error("non-finite weight {weight} for '{feature}' at factor {factor}")]
    InvalidWeight {
        feature: String,
        factor: u32,
        weight: f64,
    },

    #[error("no factor weights exported for '{0}'")]
    MissingEmbedding(String),

    #[error("embedding for '{0}' has zero norm")]
    ZeroNorm(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// True for errors that indicate inconsistent input data rather than a
    /// bad request.
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            Self::NonPositiveLogInput { .. }
                | Self::FactorOutOfRange { .. }
                | Self::InvalidWeight { .. }
                | Self::MissingEmbedding(_)
                | Self::ZeroNorm(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
