//! Pairwise co-occurrence counting.
//!
//! Items are interned into a sorted vocabulary so that index order equals
//! item_id order. Every pair key `(a, b)` therefore satisfies `a <= b` in
//! both index and id space, with equality only for self pairs.
//!
//! Pair generation is map-reduce shaped: each group maps to its `a < b`
//! pairs, and partial counts are summed per pair.

use ahash::AHashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::filters::ItemGroupMembership;

/// Dense index into an [`ItemVocabulary`].
pub type ItemIndex = u32;

/// Sorted, deduplicated item ids.
#[derive(Debug, Clone, Default)]
pub struct ItemVocabulary {
    ids: Vec<String>,
    index: AHashMap<String, ItemIndex>,
}

impl ItemVocabulary {
    pub fn from_rows(rows: &[ItemGroupMembership]) -> Self {
        let mut ids: Vec<String> = rows.iter().map(|r| r.item_id.clone()).collect();
        ids.sort_unstable();
        ids.dedup();
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as ItemIndex))
            .collect();
        Self { ids, index }
    }

    pub fn index_of(&self, item_id: &str) -> Option<ItemIndex> {
        self.index.get(item_id).copied()
    }

    pub fn id(&self, index: ItemIndex) -> &str {
        &self.ids[index as usize]
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Where a pair's count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairOrigin {
    /// Shared groups counted from the membership relation.
    Observed,
    /// `(item, item)` carrying the item's frequency.
    SelfPair,
    /// Added by negative sampling with no observed co-occurrence.
    NegativeSample,
}

impl PairOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observed => "observed",
            Self::SelfPair => "self_pair",
            Self::NegativeSample => "negative_sample",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairEntry {
    pub count: u64,
    pub origin: PairOrigin,
}

/// Co-occurrence counts plus the item frequencies they were derived from.
#[derive(Debug, Clone, Default)]
pub struct CooccurrenceTable {
    vocabulary: ItemVocabulary,
    frequencies: Vec<u64>,
    pairs: BTreeMap<(ItemIndex, ItemIndex), PairEntry>,
}

impl CooccurrenceTable {
    pub fn vocabulary(&self) -> &ItemVocabulary {
        &self.vocabulary
    }

    pub fn frequency(&self, item_id: &str) -> Option<u64> {
        self.vocabulary
            .index_of(item_id)
            .map(|i| self.frequencies[i as usize])
    }

    pub fn frequency_at(&self, index: ItemIndex) -> u64 {
        self.frequencies[index as usize]
    }

    /// Frequencies keyed by item id.
    pub fn frequencies(&self) -> BTreeMap<String, u64> {
        self.vocabulary
            .ids()
            .iter()
            .cloned()
            .zip(self.frequencies.iter().copied())
            .collect()
    }

    /// Sum of all item frequencies.
    pub fn total_frequency(&self) -> u64 {
        self.frequencies.iter().sum()
    }

    /// Count for an unordered pair; argument order does not matter.
    pub fn count(&self, a: &str, b: &str) -> Option<u64> {
        self.entry(a, b).map(|e| e.count)
    }

    pub fn entry(&self, a: &str, b: &str) -> Option<PairEntry> {
        let a = self.vocabulary.index_of(a)?;
        let b = self.vocabulary.index_of(b)?;
        self.pairs.get(&(a.min(b), a.max(b))).copied()
    }

    /// Pairs in `(item1, item2)` index order.
    pub fn iter(&self) -> impl Iterator<Item = ((ItemIndex, ItemIndex), PairEntry)> + '_ {
        self.pairs.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Keep the larger count for every pair in `extra`.
    ///
    /// Pairs not yet present are inserted as [`PairOrigin::NegativeSample`];
    /// existing pairs keep their origin and never lose count.
    pub fn merge_max<I>(&mut self, extra: I) -> usize
    where
        I: IntoIterator<Item = ((ItemIndex, ItemIndex), u64)>,
    {
        let mut added = 0;
        for ((a, b), count) in extra {
            let key = (a.min(b), a.max(b));
            match self.pairs.get_mut(&key) {
                Some(entry) => entry.count = entry.count.max(count),
                None => {
                    self.pairs.insert(
                        key,
                        PairEntry {
                            count,
                            origin: PairOrigin::NegativeSample,
                        },
                    );
                    added += 1;
                }
            }
        }
        added
    }
}

/// Count shared groups for every item pair and append self pairs.
///
/// `rows` must already be deduplicated and filtered; frequencies are
/// recomputed from exactly these rows.
pub fn count_cooccurrences(rows: &[ItemGroupMembership]) -> CooccurrenceTable {
    let vocabulary = ItemVocabulary::from_rows(rows);
    let mut frequencies = vec![0u64; vocabulary.len()];

    let mut groups: AHashMap<&str, Vec<ItemIndex>> = AHashMap::new();
    for row in rows {
        // Every row's item is in the vocabulary by construction.
        if let Some(idx) = vocabulary.index_of(&row.item_id) {
            frequencies[idx as usize] += 1;
            groups.entry(row.group_id.as_str()).or_default().push(idx);
        }
    }

    let group_members: Vec<Vec<ItemIndex>> =
        groups.into_iter().map(|(_, members)| members).collect();
    let observed = group_members
        .into_par_iter()
        .fold(AHashMap::new, |mut acc, mut members| {
            members.sort_unstable();
            members.dedup();
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    *acc.entry((a, b)).or_insert(0u64) += 1;
                }
            }
            acc
        })
        .reduce(AHashMap::new, |mut left, right| {
            for (key, count) in right {
                *left.entry(key).or_insert(0) += count;
            }
            left
        });

    let mut pairs: BTreeMap<(ItemIndex, ItemIndex), PairEntry> = observed
        .into_iter()
        .map(|(key, count)| {
            (
                key,
                PairEntry {
                    count,
                    origin: PairOrigin::Observed,
                },
            )
        })
        .collect();
    let observed_pairs = pairs.len();

    for (idx, &freq) in frequencies.iter().enumerate() {
        let idx = idx as ItemIndex;
        pairs.insert(
            (idx, idx),
            PairEntry {
                count: freq,
                origin: PairOrigin::SelfPair,
            },
        );
    }

    debug!(
        items = vocabulary.len(),
        observed_pairs,
        total_pairs = pairs.len(),
        "co-occurrence counts computed"
    );

    CooccurrenceTable {
        vocabulary,
        frequencies,
        pairs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Vec<ItemGroupMembership> {
        [("i1", "g1"), ("i2", "g1"), ("i3", "g1"), ("i1", "g2"), ("i2", "g2")]
            .iter()
            .map(|(i, g)| ItemGroupMembership::new(*i, *g))
            .collect()
    }

    #[test]
    fn test_scenario_counts() {
        let table = count_cooccurrences(&scenario());
        assert_eq!(table.count("i1", "i2"), Some(2));
        assert_eq!(table.count("i1", "i3"), Some(1));
        assert_eq!(table.count("i2", "i3"), Some(1));
        assert_eq!(table.count("i3", "i1"), Some(1));
        assert_eq!(table.frequency("i1"), Some(2));
        assert_eq!(table.frequency("i2"), Some(2));
        assert_eq!(table.frequency("i3"), Some(1));
        assert_eq!(table.total_frequency(), 5);
        assert_eq!(table.len(), 6);
    }

    #[test]
    fn test_self_pairs_equal_frequency() {
        let table = count_cooccurrences(&scenario());
        for id in table.vocabulary().ids() {
            let entry = table.entry(id, id).unwrap();
            assert_eq!(entry.origin, PairOrigin::SelfPair);
            assert_eq!(Some(entry.count), table.frequency(id));
        }
    }

    #[test]
    fn test_canonical_ordering() {
        let rows: Vec<_> = [("z", "g"), ("m", "g"), ("a", "g"), ("m", "h"), ("a", "h")]
            .iter()
            .map(|(i, g)| ItemGroupMembership::new(*i, *g))
            .collect();
        let table = count_cooccurrences(&rows);
        for ((a, b), entry) in table.iter() {
            let (id1, id2) = (table.vocabulary().id(a), table.vocabulary().id(b));
            if entry.origin == PairOrigin::SelfPair {
                assert_eq!(id1, id2);
            } else {
                assert!(id1 < id2, "{id1} !< {id2}");
            }
        }
        assert_eq!(table.count("a", "m"), Some(2));
    }

    #[test]
    fn test_merge_max_never_decreases() {
        let mut table = count_cooccurrences(&scenario());
        let i1 = table.vocabulary().index_of("i1").unwrap();
        let i2 = table.vocabulary().index_of("i2").unwrap();
        let i3 = table.vocabulary().index_of("i3").unwrap();

        let added = table.merge_max(vec![((i2, i1), 1), ((i1, i3), 5)]);
        assert_eq!(added, 0);
        assert_eq!(table.count("i1", "i2"), Some(2));
        assert_eq!(table.count("i1", "i3"), Some(5));
        assert_eq!(table.entry("i1", "i3").unwrap().origin, PairOrigin::Observed);
    }

    #[test]
    fn test_empty_rows() {
        let table = count_cooccurrences(&[]);
        assert!(table.is_empty());
        assert_eq!(table.total_frequency(), 0);
        assert!(table.vocabulary().is_empty());
    }
}
