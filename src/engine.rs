//! Co-occurrence and PMI engine.
//!
//! Runs the stages in a fixed order, each a pure function of the previous
//! stage's output:
//!
//! 1. [`filters::membership_filter`]: valid items and groups, one pass
//! 2. [`count_cooccurrences`]: shared-group counts, self pairs, frequencies
//! 3. [`apply_negative_sampling`]: optional, max-merge
//! 4. [`score_pairs`]: PMI and `cooc * pmi`
//!
//! ```
//! use fast_cooc::{CooccurrenceEngine, ItemGroupMembership, PipelineConfig};
//!
//! let rows = vec![
//!     ItemGroupMembership::new("i1", "g1"),
//!     ItemGroupMembership::new("i2", "g1"),
//! ];
//! let engine = CooccurrenceEngine::new(PipelineConfig::new().with_min_item_frequency(1)).unwrap();
//! let table = engine.run(rows).unwrap().into_table().unwrap();
//! assert_eq!(table.total_frequency, 2);
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::cooccurrence::count_cooccurrences;
use crate::error::Result;
use crate::filters::{self, FilterReport, ItemGroupMembership};
use crate::membership_store::MembershipStore;
use crate::negative_sampler::apply_negative_sampling;
use crate::pmi::{score_pairs, ScoredPair};

/// Why a run produced no pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    NoMemberships,
    NoValidItems,
    NoValidGroups,
    /// Valid items and valid groups exist but never meet.
    NoSurvivingMemberships,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoMemberships => "input relation is empty",
            Self::NoValidItems => "no item meets the minimum frequency",
            Self::NoValidGroups => "no group size is within the allowed range",
            Self::NoSurvivingMemberships => "no valid item belongs to a valid group",
        };
        f.write_str(text)
    }
}

/// The scored pair table of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PmiTable {
    /// Ordered by score descending, then `(item1_id, item2_id)`.
    pub pairs: Vec<ScoredPair>,
    pub frequencies: BTreeMap<String, u64>,
    pub total_frequency: u64,
    pub negative_pairs_added: usize,
    pub report: FilterReport,
}

impl PmiTable {
    /// Pair lookup in either argument order.
    pub fn pair(&self, a: &str, b: &str) -> Option<&ScoredPair> {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        self.pairs
            .iter()
            .find(|p| p.item1_id == first && p.item2_id == second)
    }

    /// Highest scoring `n` pairs, self pairs excluded.
    pub fn top(&self, n: usize) -> Vec<&ScoredPair> {
        self.pairs
            .iter()
            .filter(|p| p.item1_id != p.item2_id)
            .take(n)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Result of a run: either a table or a distinct empty state.
#[derive(Debug, Clone)]
pub enum PmiOutcome {
    Scored(PmiTable),
    Empty {
        reason: EmptyReason,
        report: FilterReport,
    },
}

impl PmiOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }

    pub fn table(&self) -> Option<&PmiTable> {
        match self {
            Self::Scored(table) => Some(table),
            Self::Empty { .. } => None,
        }
    }

    pub fn into_table(self) -> Option<PmiTable> {
        match self {
            Self::Scored(table) => Some(table),
            Self::Empty { .. } => None,
        }
    }

    pub fn report(&self) -> &FilterReport {
        match self {
            Self::Scored(table) => &table.report,
            Self::Empty { report, .. } => report,
        }
    }
}

/// Validated entry point for PMI computation.
#[derive(Debug, Clone)]
pub struct CooccurrenceEngine {
    config: PipelineConfig,
}

impl CooccurrenceEngine {
    /// # Errors
    ///
    /// Rejects an invalid configuration before any data is read.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all stages over the given relation.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub fn run(&self, rows: Vec<ItemGroupMembership>) -> Result<PmiOutcome> {
        if rows.is_empty() {
            return Ok(self.empty(EmptyReason::NoMemberships, FilterReport::default()));
        }

        let filtered = filters::membership_filter(
            rows,
            self.config.min_item_frequency,
            self.config.max_group_size,
        );
        let report = filtered.report;
        info!(
            valid_items = report.valid_items,
            valid_groups = report.valid_groups,
            kept_rows = report.kept_rows,
            "memberships filtered"
        );

        if report.valid_items == 0 {
            return Ok(self.empty(EmptyReason::NoValidItems, report));
        }
        if report.valid_groups == 0 {
            return Ok(self.empty(EmptyReason::NoValidGroups, report));
        }
        if filtered.kept.is_empty() {
            return Ok(self.empty(EmptyReason::NoSurvivingMemberships, report));
        }

        let mut table = count_cooccurrences(&filtered.kept);
        let negative_pairs_added =
            apply_negative_sampling(&mut table, self.config.negative_sample_size);
        let pairs = score_pairs(&table)?;
        let total_frequency = table.total_frequency();

        info!(
            items = table.vocabulary().len(),
            pairs = pairs.len(),
            total_frequency,
            negative_pairs_added,
            "pmi table scored"
        );

        Ok(PmiOutcome::Scored(PmiTable {
            pairs,
            frequencies: table.frequencies(),
            total_frequency,
            negative_pairs_added,
            report,
        }))
    }

    /// Run over a snapshot of a membership store.
    pub fn run_store(&self, store: &MembershipStore) -> Result<PmiOutcome> {
        self.run(store.snapshot())
    }

    fn empty(&self, reason: EmptyReason, report: FilterReport) -> PmiOutcome {
        warn!(%reason, "pmi computation produced no pairs");
        PmiOutcome::Empty { reason, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn rows(pairs: &[(&str, &str)]) -> Vec<ItemGroupMembership> {
        pairs
            .iter()
            .map(|(i, g)| ItemGroupMembership::new(*i, *g))
            .collect()
    }

    fn engine(min_freq: u64, max_group: usize, negatives: usize) -> CooccurrenceEngine {
        CooccurrenceEngine::new(
            PipelineConfig::new()
                .with_min_item_frequency(min_freq)
                .with_max_group_size(max_group)
                .with_negative_sample_size(negatives),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = CooccurrenceEngine::new(PipelineConfig::new().with_max_group_size(0)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { .. }));
    }

    #[test]
    fn test_empty_input() {
        let outcome = engine(1, 10, 0).run(Vec::new()).unwrap();
        assert!(matches!(
            outcome,
            PmiOutcome::Empty {
                reason: EmptyReason::NoMemberships,
                ..
            }
        ));
    }

    #[test]
    fn test_no_valid_items() {
        let outcome = engine(5, 10, 0).run(rows(&[("a", "g"), ("b", "g")])).unwrap();
        assert!(matches!(
            outcome,
            PmiOutcome::Empty {
                reason: EmptyReason::NoValidItems,
                ..
            }
        ));
        assert_eq!(outcome.report().valid_items, 0);
    }

    #[test]
    fn test_no_valid_groups() {
        let outcome = engine(1, 10, 0).run(rows(&[("a", "g1"), ("b", "g2")])).unwrap();
        assert!(matches!(
            outcome,
            PmiOutcome::Empty {
                reason: EmptyReason::NoValidGroups,
                ..
            }
        ));
    }

    #[test]
    fn test_no_surviving_memberships() {
        // "a" is frequent only via singleton groups; "g" is valid but only
        // holds infrequent items.
        let outcome = engine(2, 10, 0)
            .run(rows(&[("a", "s1"), ("a", "s2"), ("b", "g"), ("c", "g")]))
            .unwrap();
        assert!(matches!(
            outcome,
            PmiOutcome::Empty {
                reason: EmptyReason::NoSurvivingMemberships,
                ..
            }
        ));
    }

    #[test]
    fn test_scenario() {
        let outcome = engine(1, 10, 0)
            .run(rows(&[("i1", "g1"), ("i2", "g1"), ("i3", "g1"), ("i1", "g2"), ("i2", "g2")]))
            .unwrap();
        let table = outcome.into_table().unwrap();
        assert_eq!(table.total_frequency, 5);
        assert_eq!(table.frequencies["i1"], 2);
        assert_eq!(table.frequencies["i3"], 1);
        assert_eq!(table.pair("i2", "i1").unwrap().cooc, 2);
        assert_eq!(table.pair("i1", "i3").unwrap().cooc, 1);
        assert_eq!(table.negative_pairs_added, 0);
        assert_eq!(table.len(), 6);

        let top = table.top(1);
        assert_eq!(top.len(), 1);
        assert_ne!(top[0].item1_id, top[0].item2_id);
    }

    #[test]
    fn test_frequency_recomputed_after_filtering() {
        // "a" is in four groups, but two of them exceed max_group_size.
        let outcome = engine(1, 2, 0)
            .run(rows(&[
                ("a", "g1"),
                ("b", "g1"),
                ("a", "g2"),
                ("b", "g2"),
                ("a", "big1"),
                ("b", "big1"),
                ("c", "big1"),
                ("a", "big2"),
                ("b", "big2"),
                ("c", "big2"),
            ]))
            .unwrap();
        let table = outcome.into_table().unwrap();
        assert_eq!(table.frequencies.get("a"), Some(&2));
        assert_eq!(table.frequencies.get("c"), None);
        assert_eq!(table.total_frequency, 4);
    }

    #[test]
    fn test_negative_sampling_scenario() {
        let table = engine(1, 10, 2)
            .run(rows(&[("i1", "g1"), ("i2", "g1"), ("i3", "g1"), ("i1", "g2"), ("i2", "g2")]))
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!(table.pair("i1", "i2").unwrap().cooc, 2);
        assert_eq!(table.negative_pairs_added, 0);
    }

    #[test]
    fn test_run_store() {
        let store = MembershipStore::new();
        store.insert("x", "g");
        store.insert("y", "g");
        let table = engine(1, 10, 0).run_store(&store).unwrap().into_table().unwrap();
        assert_eq!(table.pair("x", "y").unwrap().cooc, 1);
    }

    #[test]
    fn test_negative_score_survives() {
        // a and b are frequent but share only g1.
        let mut pairs = vec![("a", "g1"), ("b", "g1")];
        for (x, g) in [("x2", "g2"), ("x3", "g3"), ("x4", "g4"), ("x5", "g5")] {
            pairs.extend([("a", g), (x, g)]);
        }
        for (y, g) in [("y6", "g6"), ("y7", "g7"), ("y8", "g8"), ("y9", "g9")] {
            pairs.extend([("b", g), (y, g)]);
        }
        let table = engine(1, 10, 0).run(rows(&pairs)).unwrap().into_table().unwrap();
        assert_eq!(table.total_frequency, 18);

        let ab = table.pair("a", "b").unwrap();
        assert_eq!((ab.cooc, ab.freq1, ab.freq2), (1, 5, 5));
        let expected = (18.0f64 / 25.0).log2();
        assert!(ab.score < 0.0);
        assert!((ab.pmi - expected).abs() < 1e-12);
        assert!((ab.score - expected).abs() < 1e-12);

        let last = table.pairs.last().unwrap();
        assert_eq!((last.item1_id.as_str(), last.item2_id.as_str()), ("a", "b"));
        assert_eq!(table.pairs.iter().filter(|p| p.score < 0.0).count(), 1);
    }
}
