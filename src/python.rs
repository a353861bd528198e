//! Python bindings.
//!
//! Build: `maturin develop --release --features extension-module`
//!
//! ```python
//! import fast_cooc
//!
//! fast_cooc.init_logging("info")
//! result = fast_cooc.compute_pmi(item_ids, group_ids, min_item_frequency=15)
//! for pair in result.top(10):
//!     print(pair.item1_id, pair.item2_id, pair.score)
//!
//! print(fast_cooc.training_options(num_factors=100))
//!
//! neighbors = fast_cooc.cosine_neighbors(features, factor_weights, dimensions=100)
//! ```

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;

use crate::config::{PipelineConfig, ZeroNormPolicy};
use crate::embedding::{self, FactorRow};
use crate::engine::{CooccurrenceEngine, PmiOutcome, PmiTable};
use crate::error::PipelineError;
use crate::filters::ItemGroupMembership;
use crate::handoff::{self, MatrixFactorizationOptions, TrainingRow};
use crate::membership_store::MembershipStore;
use crate::similarity;

fn to_pyerr(err: PipelineError) -> PyErr {
    match err {
        PipelineError::Io(_) => PyIOError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn non_negative(field: &'static str, value: i64) -> PyResult<u64> {
    u64::try_from(value).map_err(|_| {
        to_pyerr(PipelineError::invalid_config(
            field,
            format!("must not be negative, got {value}"),
        ))
    })
}

fn engine_config(
    min_item_frequency: i64,
    max_group_size: i64,
    negative_sample_size: i64,
) -> PyResult<PipelineConfig> {
    let config = PipelineConfig::new()
        .with_min_item_frequency(non_negative("min_item_frequency", min_item_frequency)?)
        .with_max_group_size(non_negative("max_group_size", max_group_size)? as usize)
        .with_negative_sample_size(non_negative("negative_sample_size", negative_sample_size)? as usize);
    config.validate().map_err(to_pyerr)?;
    Ok(config)
}

fn zero_norm_policy(name: &str) -> PyResult<ZeroNormPolicy> {
    match name {
        "zero" => Ok(ZeroNormPolicy::Zero),
        "fail" => Ok(ZeroNormPolicy::Fail),
        other => Err(PyValueError::new_err(format!(
            "zero_norm must be 'zero' or 'fail', got '{other}'"
        ))),
    }
}

fn factor_rows(features: Vec<String>, factor_weights: Vec<Vec<(u32, f64)>>) -> PyResult<Vec<FactorRow>> {
    if features.len() != factor_weights.len() {
        return Err(to_pyerr(PipelineError::LengthMismatch {
            left: "features",
            left_len: features.len(),
            right: "factor_weights",
            right_len: factor_weights.len(),
        }));
    }
    Ok(features
        .into_iter()
        .zip(factor_weights)
        .map(|(feature, weights)| FactorRow::new(feature, &weights))
        .collect())
}

/// One scored pair.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PmiPair {
    #[pyo3(get)]
    pub item1_id: String,
    #[pyo3(get)]
    pub item2_id: String,
    #[pyo3(get)]
    pub cooc: u64,
    #[pyo3(get)]
    pub pmi: f64,
    #[pyo3(get)]
    pub score: f64,
    /// "observed", "self_pair" or "negative_sample"
    #[pyo3(get)]
    pub origin: String,
}

#[pymethods]
impl PmiPair {
    fn __repr__(&self) -> String {
        format!(
            "PmiPair({}, {}, cooc={}, pmi={:.5}, score={:.5})",
            self.item1_id, self.item2_id, self.cooc, self.pmi, self.score
        )
    }
}

/// Scored pair table, or an empty result with its reason.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PmiResult {
    /// Ordered by score descending.
    #[pyo3(get)]
    pub pairs: Vec<PmiPair>,
    #[pyo3(get)]
    pub frequencies: HashMap<String, u64>,
    #[pyo3(get)]
    pub total_frequency: u64,
    /// Set when no pairs were produced.
    #[pyo3(get)]
    pub empty_reason: Option<String>,
    table: Option<PmiTable>,
}

impl PmiResult {
    fn from_outcome(outcome: PmiOutcome) -> Self {
        match outcome {
            PmiOutcome::Scored(table) => Self {
                pairs: table
                    .pairs
                    .iter()
                    .map(|p| PmiPair {
                        item1_id: p.item1_id.clone(),
                        item2_id: p.item2_id.clone(),
                        cooc: p.cooc,
                        pmi: p.pmi,
                        score: p.score,
                        origin: p.origin.as_str().to_string(),
                    })
                    .collect(),
                frequencies: table.frequencies.clone().into_iter().collect(),
                total_frequency: table.total_frequency,
                empty_reason: None,
                table: Some(table),
            },
            PmiOutcome::Empty { reason, .. } => Self {
                pairs: Vec::new(),
                frequencies: HashMap::new(),
                total_frequency: 0,
                empty_reason: Some(reason.to_string()),
                table: None,
            },
        }
    }

    fn training(&self) -> Vec<TrainingRow> {
        self.table
            .as_ref()
            .map(handoff::training_rows)
            .unwrap_or_default()
    }
}

#[pymethods]
impl PmiResult {
    fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Highest scoring pairs, self pairs excluded.
    #[pyo3(signature = (n=10))]
    fn top(&self, n: usize) -> Vec<PmiPair> {
        self.pairs
            .iter()
            .filter(|p| p.item1_id != p.item2_id)
            .take(n)
            .cloned()
            .collect()
    }

    /// (item1_id, item2_id, score) rows for the factorization trainer.
    fn training_rows(&self) -> Vec<(String, String, f64)> {
        self.training()
            .into_iter()
            .map(|row| (row.item1_id, row.item2_id, row.score))
            .collect()
    }

    fn __len__(&self) -> usize {
        self.pairs.len()
    }

    fn __repr__(&self) -> String {
        match &self.empty_reason {
            Some(reason) => format!("PmiResult(empty: {reason})"),
            None => format!(
                "PmiResult(pairs={}, items={}, total_frequency={})",
                self.pairs.len(),
                self.frequencies.len(),
                self.total_frequency
            ),
        }
    }
}

fn run_engine(py: Python<'_>, config: PipelineConfig, rows: Vec<ItemGroupMembership>) -> PyResult<PmiResult> {
    let outcome = py
        .allow_threads(|| CooccurrenceEngine::new(config).and_then(|engine| engine.run(rows)))
        .map_err(to_pyerr)?;
    Ok(PmiResult::from_outcome(outcome))
}

/// Compute co-occurrence counts and PMI scores.
///
/// Args:
///     item_ids: item column of the membership relation
///     group_ids: group column (same length)
///     min_item_frequency: minimum memberships per item (default 15)
///     max_group_size: largest group kept (default 100)
///     negative_sample_size: top-N frequent items to pair as negatives (default 0)
///
/// Returns:
///     PmiResult, empty with `empty_reason` set when filters leave nothing.
///
/// Raises:
///     ValueError on invalid settings, mismatched columns or inconsistent data.
#[pyfunction]
#[pyo3(signature = (item_ids, group_ids, min_item_frequency=15, max_group_size=100, negative_sample_size=0))]
pub fn compute_pmi(
    py: Python<'_>,
    item_ids: Vec<String>,
    group_ids: Vec<String>,
    min_item_frequency: i64,
    max_group_size: i64,
    negative_sample_size: i64,
) -> PyResult<PmiResult> {
    let config = engine_config(min_item_frequency, max_group_size, negative_sample_size)?;
    if item_ids.len() != group_ids.len() {
        return Err(to_pyerr(PipelineError::LengthMismatch {
            left: "item_ids",
            left_len: item_ids.len(),
            right: "group_ids",
            right_len: group_ids.len(),
        }));
    }
    let rows = item_ids
        .into_iter()
        .zip(group_ids)
        .map(|(item, group)| ItemGroupMembership::new(item, group))
        .collect();
    run_engine(py, config, rows)
}

/// Concurrent membership index for incremental loading.
///
/// Python usage:
///   store = MembershipStore()
///   store.insert_batch(item_ids, group_ids)
///   result = store.compute_pmi(min_item_frequency=15)
#[pyclass(name = "MembershipStore")]
#[derive(Debug, Clone, Default)]
pub struct PyMembershipStore {
    inner: MembershipStore,
}

#[pymethods]
impl PyMembershipStore {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    /// Returns False if the membership was already stored.
    fn insert(&self, item_id: String, group_id: String) -> bool {
        self.inner.insert(item_id, group_id)
    }

    fn insert_batch(&self, py: Python<'_>, item_ids: Vec<String>, group_ids: Vec<String>) -> PyResult<usize> {
        py.allow_threads(|| self.inner.insert_batch(item_ids, group_ids))
            .map_err(to_pyerr)
    }

    fn group_items(&self, group_id: &str) -> Vec<String> {
        self.inner.group_items(group_id)
    }

    /// (groups, memberships)
    fn stats(&self) -> (usize, usize) {
        let stats = self.inner.stats();
        (stats.groups, stats.memberships)
    }

    fn clear(&self) {
        self.inner.clear();
    }

    #[pyo3(signature = (min_item_frequency=15, max_group_size=100, negative_sample_size=0))]
    fn compute_pmi(
        &self,
        py: Python<'_>,
        min_item_frequency: i64,
        max_group_size: i64,
        negative_sample_size: i64,
    ) -> PyResult<PmiResult> {
        let config = engine_config(min_item_frequency, max_group_size, negative_sample_size)?;
        run_engine(py, config, self.inner.snapshot())
    }

    fn __len__(&self) -> usize {
        self.inner.stats().memberships
    }

    fn __repr__(&self) -> String {
        let stats = self.inner.stats();
        format!(
            "MembershipStore(groups={}, memberships={})",
            stats.groups, stats.memberships
        )
    }
}

/// Sum sparse factor rows into dense vectors.
///
/// Args:
///     features: item id of each exported row
///     factor_weights: per row, a list of (factor, weight) with 1-based factor
///     dimensions: vector length (default 100)
///     items: restrict to these items; each must have at least one row
///
/// Returns:
///     dict item_id → list of floats
#[pyfunction]
#[pyo3(signature = (features, factor_weights, dimensions=100, items=None))]
pub fn build_embeddings(
    features: Vec<String>,
    factor_weights: Vec<Vec<(u32, f64)>>,
    dimensions: usize,
    items: Option<Vec<String>>,
) -> PyResult<HashMap<String, Vec<f64>>> {
    let rows = factor_rows(features, factor_weights)?;
    let table = embedding::build_embeddings(&rows, dimensions, items.as_deref()).map_err(to_pyerr)?;
    Ok(table.into_inner().into_iter().collect())
}

fn neighbors_for_rows(
    rows: &[FactorRow],
    dimensions: usize,
    items: Option<Vec<String>>,
    zero_norm: &str,
) -> PyResult<HashMap<String, Vec<(String, f64)>>> {
    let policy = zero_norm_policy(zero_norm)?;
    let table = embedding::build_embeddings(rows, dimensions, items.as_deref()).map_err(to_pyerr)?;
    let map = similarity::neighbor_map(&table, policy).map_err(to_pyerr)?;
    Ok(map
        .into_iter()
        .map(|(item, neighbors)| {
            let ranked = neighbors
                .into_iter()
                .map(|n| (n.item_id, n.similarity))
                .collect();
            (item, ranked)
        })
        .collect())
}

/// Rank every item's neighbors by cosine similarity.
///
/// Args:
///     features, factor_weights, dimensions, items: as in build_embeddings
///     zero_norm: "zero" (similarity 0.0) or "fail" for all-zero vectors
///
/// Returns:
///     dict item_id → [(other_item_id, similarity)], similarity rounded to 5 places,
///     highest first.
#[pyfunction]
#[pyo3(signature = (features, factor_weights, dimensions=100, items=None, zero_norm="zero"))]
pub fn cosine_neighbors(
    features: Vec<String>,
    factor_weights: Vec<Vec<(u32, f64)>>,
    dimensions: usize,
    items: Option<Vec<String>>,
    zero_norm: &str,
) -> PyResult<HashMap<String, Vec<(String, f64)>>> {
    let rows = factor_rows(features, factor_weights)?;
    neighbors_for_rows(&rows, dimensions, items, zero_norm)
}

/// Same as cosine_neighbors, reading the trainer's weight export as JSON
/// (array or JSON lines).
#[pyfunction]
#[pyo3(signature = (export_json, dimensions=100, items=None, zero_norm="zero"))]
pub fn neighbors_from_export(
    export_json: &str,
    dimensions: usize,
    items: Option<Vec<String>>,
    zero_norm: &str,
) -> PyResult<HashMap<String, Vec<(String, f64)>>> {
    let rows = embedding::parse_factor_rows(export_json).map_err(to_pyerr)?;
    neighbors_for_rows(&rows, dimensions, items, zero_norm)
}

/// OPTIONS(...) clause for the implicit-feedback factorization model.
#[pyfunction]
#[pyo3(signature = (num_factors=100, l2_reg=1.0))]
pub fn training_options(num_factors: usize, l2_reg: f64) -> PyResult<String> {
    let options = MatrixFactorizationOptions {
        num_factors,
        l2_reg,
        ..MatrixFactorizationOptions::default()
    };
    options.validate().map_err(to_pyerr)?;
    Ok(options.options_clause())
}

/// Write a result's training rows as JSON lines to `path`.
#[pyfunction]
pub fn write_training_rows(result: PyRef<'_, PmiResult>, path: &str) -> PyResult<usize> {
    let rows = result.training();
    let file = std::fs::File::create(path).map_err(|e| to_pyerr(e.into()))?;
    handoff::write_training_rows(&rows, std::io::BufWriter::new(file)).map_err(to_pyerr)
}

/// Route library logs to stderr. `RUST_LOG` overrides `level`.
#[pyfunction]
#[pyo3(signature = (level="info"))]
pub fn init_logging(level: &str) -> PyResult<bool> {
    crate::logging::init_tracing(level).map_err(to_pyerr)
}

/// fast_cooc: item co-occurrence, PMI scoring and embedding similarity.
#[pymodule]
pub fn fast_cooc(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Co-occurrence & PMI
    m.add_class::<PmiPair>()?;
    m.add_class::<PmiResult>()?;
    m.add_class::<PyMembershipStore>()?;
    m.add_function(wrap_pyfunction!(compute_pmi, m)?)?;

    // Trainer handoff
    m.add_function(wrap_pyfunction!(training_options, m)?)?;
    m.add_function(wrap_pyfunction!(write_training_rows, m)?)?;

    // Embedding similarity
    m.add_function(wrap_pyfunction!(build_embeddings, m)?)?;
    m.add_function(wrap_pyfunction!(cosine_neighbors, m)?)?;
    m.add_function(wrap_pyfunction!(neighbors_from_export, m)?)?;

    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    Ok(())
}
