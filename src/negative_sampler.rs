//! Negative sampling among the most frequent items.
//!
//! The top-N items by frequency are paired with each other at count 1 and
//! merged into the co-occurrence table with a max aggregation, so an observed
//! co-occurrence is never lowered. This gives the factorization trainer a
//! weak signal for frequent items that rarely appear together.

use tracing::debug;

use crate::cooccurrence::{CooccurrenceTable, ItemIndex};

/// Count assigned to every synthetic pair.
pub const NEGATIVE_PAIR_COUNT: u64 = 1;

/// The `n` most frequent items, highest first.
///
/// Ties are broken by item_id ascending, which is the vocabulary order.
pub fn top_frequent_items(table: &CooccurrenceTable, n: usize) -> Vec<ItemIndex> {
    let mut items: Vec<ItemIndex> = (0..table.vocabulary().len() as ItemIndex).collect();
    items.sort_by(|&a, &b| {
        table
            .frequency_at(b)
            .cmp(&table.frequency_at(a))
            .then(a.cmp(&b))
    });
    items.truncate(n);
    items
}

/// All `a < b` pairs within `items`, each with count 1.
pub fn negative_pairs(items: &[ItemIndex]) -> Vec<((ItemIndex, ItemIndex), u64)> {
    let mut sorted = items.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut pairs = Vec::with_capacity(sorted.len() * sorted.len().saturating_sub(1) / 2);
    for (i, &a) in sorted.iter().enumerate() {
        for &b in &sorted[i + 1..] {
            pairs.push(((a, b), NEGATIVE_PAIR_COUNT));
        }
    }
    pairs
}

/// Inject negative pairs for the top `sample_size` items.
///
/// Returns the number of pairs that did not exist before.
pub fn apply_negative_sampling(table: &mut CooccurrenceTable, sample_size: usize) -> usize {
    if sample_size == 0 {
        return 0;
    }
    let top = top_frequent_items(table, sample_size);
    let pairs = negative_pairs(&top);
    let candidates = pairs.len();
    let added = table.merge_max(pairs);
    debug!(
        top_items = top.len(),
        candidates, added, "negative samples merged"
    );
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooccurrence::{count_cooccurrences, PairOrigin};
    use crate::filters::ItemGroupMembership;

    fn table(pairs: &[(&str, &str)]) -> CooccurrenceTable {
        let rows: Vec<_> = pairs
            .iter()
            .map(|(i, g)| ItemGroupMembership::new(*i, *g))
            .collect();
        count_cooccurrences(&rows)
    }

    #[test]
    fn test_top_items_tie_break_by_id() {
        let t = table(&[("b", "g1"), ("a", "g1"), ("c", "g1"), ("c", "g2"), ("b", "g2")]);
        let top: Vec<&str> = top_frequent_items(&t, 3)
            .into_iter()
            .map(|i| t.vocabulary().id(i))
            .collect();
        assert_eq!(top, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_top_items_larger_than_vocabulary() {
        let t = table(&[("a", "g"), ("b", "g")]);
        assert_eq!(top_frequent_items(&t, 10).len(), 2);
    }

    #[test]
    fn test_negative_pairs_are_canonical() {
        let pairs = negative_pairs(&[3, 1, 2, 1]);
        assert_eq!(pairs, vec![((1, 2), 1), ((1, 3), 1), ((2, 3), 1)]);
        assert!(negative_pairs(&[7]).is_empty());
    }

    #[test]
    fn test_sampling_keeps_observed_counts() {
        let mut t = table(&[
            ("i1", "g1"),
            ("i2", "g1"),
            ("i3", "g1"),
            ("i1", "g2"),
            ("i2", "g2"),
        ]);
        let added = apply_negative_sampling(&mut t, 2);
        assert_eq!(added, 0);
        assert_eq!(t.count("i1", "i2"), Some(2));
    }

    #[test]
    fn test_sampling_adds_unseen_pairs() {
        let mut t = table(&[
            ("a", "g1"),
            ("x", "g1"),
            ("a", "g2"),
            ("y", "g2"),
            ("b", "g3"),
            ("x", "g3"),
            ("b", "g4"),
            ("y", "g4"),
        ]);
        let before: Vec<_> = t.iter().collect();
        assert_eq!(t.count("a", "b"), None);

        let added = apply_negative_sampling(&mut t, 2);
        assert_eq!(added, 1);
        let entry = t.entry("a", "b").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.origin, PairOrigin::NegativeSample);

        for ((a, b), old) in before {
            let ids = (t.vocabulary().id(a), t.vocabulary().id(b));
            assert!(t.count(ids.0, ids.1).unwrap() >= old.count);
        }
    }

    #[test]
    fn test_zero_sample_size_is_noop() {
        let mut t = table(&[("a", "g"), ("b", "h")]);
        let len = t.len();
        assert_eq!(apply_negative_sampling(&mut t, 0), 0);
        assert_eq!(t.len(), len);
    }
}
