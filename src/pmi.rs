//! PMI scoring of co-occurrence pairs.
//!
//!   pmi   = log2(cooc) - log2(freq1) - log2(freq2) + log2(total)
//!   score = cooc * pmi
//!
//! Negative PMI (less co-occurrence than chance) gives a negative score and
//! is kept as is.

use serde::Serialize;
use std::cmp::Ordering;

use crate::cooccurrence::{CooccurrenceTable, PairOrigin};
use crate::error::{PipelineError, Result};

/// One scored pair, `item1_id <= item2_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPair {
    pub item1_id: String,
    pub item2_id: String,
    pub cooc: u64,
    pub freq1: u64,
    pub freq2: u64,
    pub pmi: f64,
    pub score: f64,
    pub origin: PairOrigin,
}

/// Pointwise mutual information from raw counts.
///
/// Returns `None` if any input is zero, since log2 is undefined there.
pub fn pmi(cooc: u64, freq1: u64, freq2: u64, total: u64) -> Option<f64> {
    if cooc == 0 || freq1 == 0 || freq2 == 0 || total == 0 {
        return None;
    }
    Some((cooc as f64).log2() - (freq1 as f64).log2() - (freq2 as f64).log2() + (total as f64).log2())
}

/// Descending by score, then ascending by `(item1_id, item2_id)`.
pub fn by_score_desc(a: &ScoredPair, b: &ScoredPair) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.item1_id.cmp(&b.item1_id))
        .then_with(|| a.item2_id.cmp(&b.item2_id))
}

/// Score every pair of the table and sort by score descending.
///
/// # Errors
///
/// [`PipelineError::NonPositiveLogInput`] if any pair has a zero count or
/// refers to an item with zero frequency. The whole run is aborted rather
/// than skipping the pair.
pub fn score_pairs(table: &CooccurrenceTable) -> Result<Vec<ScoredPair>> {
    let total = table.total_frequency();
    let vocab = table.vocabulary();

    let mut scored = Vec::with_capacity(table.len());
    for ((a, b), entry) in table.iter() {
        let freq1 = table.frequency_at(a);
        let freq2 = table.frequency_at(b);
        let value = pmi(entry.count, freq1, freq2, total).ok_or_else(|| {
            PipelineError::NonPositiveLogInput {
                item1: vocab.id(a).to_string(),
                item2: vocab.id(b).to_string(),
                cooc: entry.count,
                freq1,
                freq2,
                total,
            }
        })?;
        scored.push(ScoredPair {
            item1_id: vocab.id(a).to_string(),
            item2_id: vocab.id(b).to_string(),
            cooc: entry.count,
            freq1,
            freq2,
            pmi: value,
            score: entry.count as f64 * value,
            origin: entry.origin,
        });
    }

    scored.sort_by(by_score_desc);
    Ok(scored)
}
