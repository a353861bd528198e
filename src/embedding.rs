//! Dense item embeddings from a sparse factor-weight export.
//!
//! The factorization trainer exports one or more rows per feature, each with
//! a list of `(factor, weight)` entries where `factor` is 1-based. Rows for
//! the same feature are summed into a single dense vector of length D.
//!
//! Accepted input shapes:
//!   - a JSON array of rows
//!   - JSON lines, one row per line
//!
//! Extra columns in the export (intercepts, processed_input) are ignored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeight {
    /// 1-based factor index.
    pub factor: u32,
    pub weight: f64,
}

/// One exported row: a feature (item id) and some of its factor weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRow {
    pub feature: String,
    pub factor_weights: Vec<FactorWeight>,
}

impl FactorRow {
    pub fn new(feature: impl Into<String>, weights: &[(u32, f64)]) -> Self {
        Self {
            feature: feature.into(),
            factor_weights: weights
                .iter()
                .map(|&(factor, weight)| FactorWeight { factor, weight })
                .collect(),
        }
    }
}

/// Parse an export given as a JSON array or as JSON lines.
pub fn parse_factor_rows(input: &str) -> Result<Vec<FactorRow>> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(PipelineError::from))
        .collect()
}

/// Read and parse an export file.
pub fn load_factor_rows(path: impl AsRef<Path>) -> Result<Vec<FactorRow>> {
    let raw = std::fs::read_to_string(path)?;
    parse_factor_rows(&raw)
}

/// item_id → dense vector, all of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    dimensions: usize,
    vectors: BTreeMap<String, Vec<f64>>,
}

impl EmbeddingTable {
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn get(&self, item_id: &str) -> Option<&[f64]> {
        self.vectors.get(item_id).map(Vec::as_slice)
    }

    /// Item ids in ascending order.
    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.vectors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.vectors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<f64>> {
        self.vectors
    }
}

/// Sum sparse factor rows into dense vectors of length `dimensions`.
///
/// When `queried` is given, only those items are built and every one of them
/// must have at least one row. Otherwise every feature in `rows` is built.
///
/// # Errors
///
/// - [`PipelineError::InvalidConfig`] if `dimensions` is 0
/// - [`PipelineError::FactorOutOfRange`] for a factor of 0 or above `dimensions`
/// - [`PipelineError::InvalidWeight`] for NaN or infinite weights
/// - [`PipelineError::MissingEmbedding`] for a queried item with no rows
pub fn build_embeddings(
    rows: &[FactorRow],
    dimensions: usize,
    queried: Option<&[String]>,
) -> Result<EmbeddingTable> {
    if dimensions == 0 {
        return Err(PipelineError::invalid_config(
            "embedding_dimensions",
            "must be at least 1, got 0",
        ));
    }
    let wanted: Option<BTreeSet<&str>> =
        queried.map(|items| items.iter().map(String::as_str).collect());

    let mut vectors: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        if let Some(wanted) = &wanted {
            if !wanted.contains(row.feature.as_str()) {
                continue;
            }
        }
        let vector = vectors
            .entry(row.feature.clone())
            .or_insert_with(|| vec![0.0; dimensions]);
        for fw in &row.factor_weights {
            if fw.factor == 0 || fw.factor as usize > dimensions {
                return Err(PipelineError::FactorOutOfRange {
                    feature: row.feature.clone(),
                    factor: fw.factor,
                    dimensions,
                });
            }
            if !fw.weight.is_finite() {
                return Err(PipelineError::InvalidWeight {
                    feature: row.feature.clone(),
                    factor: fw.factor,
                    weight: fw.weight,
                });
            }
            vector[fw.factor as usize - 1] += fw.weight;
        }
    }

    if let Some(wanted) = &wanted {
        if let Some(missing) = wanted.iter().find(|item| !vectors.contains_key(**item)) {
            return Err(PipelineError::MissingEmbedding((*missing).to_string()));
        }
    }

    debug!(items = vectors.len(), dimensions, "embeddings built");
    Ok(EmbeddingTable {
        dimensions,
        vectors,
    })
}
