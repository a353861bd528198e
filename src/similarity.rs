//! Cosine similarity and nearest-neighbor ranking over item embeddings.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::ZeroNormPolicy;
use crate::embedding::EmbeddingTable;
use crate::error::{PipelineError, Result};

/// Decimal places kept in reported similarities.
pub const SIMILARITY_PRECISION: i32 = 5;

/// Round half away from zero to [`SIMILARITY_PRECISION`] decimals.
pub fn round_similarity(value: f64) -> f64 {
    let scale = 10f64.powi(SIMILARITY_PRECISION);
    (value * scale).round() / scale
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn is_zero(a: &[f64]) -> bool {
    a.iter().all(|&x| x == 0.0)
}

/// `a` scaled to unit length, `None` for an all-zero vector.
///
/// Components are first divided by the largest magnitude so the squared sum
/// stays in `[1, len]` for any finite input.
fn unit(a: &[f64]) -> Option<Vec<f64>> {
    let max = a.iter().fold(0.0f64, |m, x| m.max(x.abs()));
    if max == 0.0 {
        return None;
    }
    let scaled: Vec<f64> = a.iter().map(|x| x / max).collect();
    let norm = dot(&scaled, &scaled).sqrt();
    Some(scaled.into_iter().map(|x| x / norm).collect())
}

/// Cosine similarity, `None` when either vector is all zeros.
///
/// The result is clamped to `[-1, 1]`.
///
/// # Panics
/// Panics if `a` and `b` have different lengths.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    assert_eq!(a.len(), b.len(), "vectors must have equal length for cosine similarity");
    let ua = unit(a)?;
    let ub = unit(b)?;
    Some(dot(&ua, &ub).clamp(-1.0, 1.0))
}

/// One entry of a neighbor list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub item_id: String,
    /// Rounded to 5 decimal places.
    pub similarity: f64,
}

/// Other items ranked by similarity to `item_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborList {
    pub item_id: String,
    pub neighbors: Vec<Neighbor>,
}

/// Similarity between two items in `embeddings`.
///
/// # Errors
///
/// [`PipelineError::MissingEmbedding`] for an unknown item, and
/// [`PipelineError::ZeroNorm`] under [`ZeroNormPolicy::Fail`].
pub fn item_similarity(
    embeddings: &EmbeddingTable,
    a: &str,
    b: &str,
    policy: ZeroNormPolicy,
) -> Result<f64> {
    let va = embeddings
        .get(a)
        .ok_or_else(|| PipelineError::MissingEmbedding(a.to_string()))?;
    let vb = embeddings
        .get(b)
        .ok_or_else(|| PipelineError::MissingEmbedding(b.to_string()))?;
    match cosine_similarity(va, vb) {
        Some(sim) => Ok(sim),
        None => match policy {
            ZeroNormPolicy::Zero => Ok(0.0),
            ZeroNormPolicy::Fail => {
                let zero = if is_zero(va) { a } else { b };
                Err(PipelineError::ZeroNorm(zero.to_string()))
            }
        },
    }
}

/// For every item, all other items ordered by rounded similarity descending,
/// ties broken by item_id ascending.
///
/// Lists come back in item_id order.
pub fn rank_neighbors(
    embeddings: &EmbeddingTable,
    policy: ZeroNormPolicy,
) -> Result<Vec<NeighborList>> {
    if policy == ZeroNormPolicy::Fail {
        if let Some((id, _)) = embeddings.iter().find(|(_, v)| is_zero(v)) {
            return Err(PipelineError::ZeroNorm(id.to_string()));
        }
    }

    let items: Vec<&str> = embeddings.items().collect();
    items
        .par_iter()
        .map(|&item| -> Result<NeighborList> {
            let mut neighbors = Vec::with_capacity(items.len().saturating_sub(1));
            for &other in &items {
                if other == item {
                    continue;
                }
                let sim = item_similarity(embeddings, item, other, policy)?;
                neighbors.push(Neighbor {
                    item_id: other.to_string(),
                    similarity: round_similarity(sim),
                });
            }
            neighbors.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.item_id.cmp(&b.item_id))
            });
            Ok(NeighborList {
                item_id: item.to_string(),
                neighbors,
            })
        })
        .collect()
}

/// [`rank_neighbors`] keyed by item id.
pub fn neighbor_map(
    embeddings: &EmbeddingTable,
    policy: ZeroNormPolicy,
) -> Result<BTreeMap<String, Vec<Neighbor>>> {
    Ok(rank_neighbors(embeddings, policy)?
        .into_iter()
        .map(|list| (list.item_id, list.neighbors))
        .collect())
}
