//! Handoff to the external matrix-factorization trainer.
//!
//! The scored pair table is written out as `(item1_id, item2_id, score)`
//! training rows, and the trainer options are rendered as the `OPTIONS(...)`
//! clause the warehouse expects:
//!
//!   model_type='matrix_factorization', feedback_type='implicit', l2_reg=1,
//!   num_factors=D, user_col='item1_id', item_col='item2_id',
//!   rating_col='score', data_split_method='no_split'

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

use crate::config::PipelineConfig;
use crate::engine::PmiTable;
use crate::error::{PipelineError, Result};
use crate::pmi::ScoredPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    #[default]
    Implicit,
    Explicit,
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Implicit => f.write_str("implicit"),
            Self::Explicit => f.write_str("explicit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSplitMethod {
    #[default]
    NoSplit,
    Random,
}

impl fmt::Display for DataSplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSplit => f.write_str("no_split"),
            Self::Random => f.write_str("random"),
        }
    }
}

/// Trainer options for the pair table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixFactorizationOptions {
    pub feedback_type: FeedbackType,
    pub l2_reg: f64,
    pub num_factors: usize,
    pub user_col: String,
    pub item_col: String,
    pub rating_col: String,
    pub data_split_method: DataSplitMethod,
}

impl Default for MatrixFactorizationOptions {
    fn default() -> Self {
        Self {
            feedback_type: FeedbackType::Implicit,
            l2_reg: 1.0,
            num_factors: crate::config::DEFAULT_EMBEDDING_DIMENSIONS,
            user_col: "item1_id".to_string(),
            item_col: "item2_id".to_string(),
            rating_col: "score".to_string(),
            data_split_method: DataSplitMethod::NoSplit,
        }
    }
}

impl MatrixFactorizationOptions {
    /// Options with `num_factors` taken from the embedding dimensionality.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            num_factors: config.embedding_dimensions,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Rejects `num_factors == 0` and a negative or non-finite `l2_reg`.
    pub fn validate(&self) -> Result<()> {
        if self.num_factors == 0 {
            return Err(PipelineError::invalid_config(
                "num_factors",
                "must be at least 1, got 0",
            ));
        }
        if !self.l2_reg.is_finite() || self.l2_reg < 0.0 {
            return Err(PipelineError::invalid_config(
                "l2_reg",
                format!("must be a non-negative number, got {}", self.l2_reg),
            ));
        }
        Ok(())
    }

    /// The `OPTIONS(...)` clause of a model creation statement.
    pub fn options_clause(&self) -> String {
        format!(
            "OPTIONS(model_type='matrix_factorization', feedback_type='{}', l2_reg={}, \
             num_factors={}, user_col='{}', item_col='{}', rating_col='{}', data_split_method='{}')",
            self.feedback_type,
            self.l2_reg,
            self.num_factors,
            self.user_col,
            self.item_col,
            self.rating_col,
            self.data_split_method,
        )
    }
}

/// One row of the trainer input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub item1_id: String,
    pub item2_id: String,
    pub score: f64,
}

impl From<&ScoredPair> for TrainingRow {
    fn from(pair: &ScoredPair) -> Self {
        Self {
            item1_id: pair.item1_id.clone(),
            item2_id: pair.item2_id.clone(),
            score: pair.score,
        }
    }
}

/// Training rows in table order.
pub fn training_rows(table: &PmiTable) -> Vec<TrainingRow> {
    table.pairs.iter().map(TrainingRow::from).collect()
}

/// Write rows as JSON lines. Returns the number of rows written.
pub fn write_training_rows<W: Write>(rows: &[TrainingRow], mut writer: W) -> Result<usize> {
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(rows.len())
}
