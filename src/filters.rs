//! Membership filters applied before any counting.
//!
//! Two independent filters are computed on the same unfiltered relation and
//! then intersected in a single pass:
//!   - valid items: membership count >= `min_item_frequency`
//!   - valid groups: distinct item count in `[2, max_group_size]`
//!
//! A row survives only if both its item and its group are valid. The filters
//! are not re-applied to the surviving rows, so an item may end up with fewer
//! memberships than `min_item_frequency` once invalid groups are dropped.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::MIN_GROUP_SIZE;

/// One (item, group) row of the raw many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemGroupMembership {
    pub item_id: String,
    pub group_id: String,
}

impl ItemGroupMembership {
    pub fn new(item_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            group_id: group_id.into(),
        }
    }
}

/// Row counts observed while filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub input_rows: usize,
    pub duplicate_rows: usize,
    pub valid_items: usize,
    pub valid_groups: usize,
    pub kept_rows: usize,
    pub removed_rows: usize,
}

/// Result of a filter operation.
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    /// Rows whose item and group both passed.
    pub kept: Vec<ItemGroupMembership>,
    /// Rows dropped by either filter.
    pub removed: Vec<ItemGroupMembership>,
    pub report: FilterReport,
}

/// Remove duplicate rows, keeping first occurrence.
///
/// Returns `(unique, duplicates)`.
pub fn dedup_filter(
    rows: Vec<ItemGroupMembership>,
) -> (Vec<ItemGroupMembership>, Vec<ItemGroupMembership>) {
    let mut seen = AHashSet::with_capacity(rows.len());
    let mut kept = Vec::with_capacity(rows.len());
    let mut removed = Vec::new();

    for row in rows {
        if seen.contains(&row) {
            removed.push(row);
        } else {
            seen.insert(row.clone());
            kept.push(row);
        }
    }

    (kept, removed)
}

/// Count memberships per item.
pub fn item_frequencies(rows: &[ItemGroupMembership]) -> AHashMap<&str, u64> {
    let mut counts: AHashMap<&str, u64> = AHashMap::new();
    for row in rows {
        *counts.entry(row.item_id.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Items with at least `min_item_frequency` memberships.
pub fn valid_items(rows: &[ItemGroupMembership], min_item_frequency: u64) -> AHashSet<&str> {
    item_frequencies(rows)
        .into_iter()
        .filter(|(_, count)| *count >= min_item_frequency)
        .map(|(item, _)| item)
        .collect()
}

/// Groups holding between 2 and `max_group_size` items.
///
/// Rows are assumed unique, so the row count per group is its item count.
pub fn valid_groups(rows: &[ItemGroupMembership], max_group_size: usize) -> AHashSet<&str> {
    let mut sizes: AHashMap<&str, usize> = AHashMap::new();
    for row in rows {
        *sizes.entry(row.group_id.as_str()).or_insert(0) += 1;
    }
    sizes
        .into_iter()
        .filter(|(_, size)| (MIN_GROUP_SIZE..=max_group_size).contains(size))
        .map(|(group, _)| group)
        .collect()
}

/// Deduplicate, then keep rows whose item and group both pass their filter.
pub fn membership_filter(
    rows: Vec<ItemGroupMembership>,
    min_item_frequency: u64,
    max_group_size: usize,
) -> FilterResult {
    let input_rows = rows.len();
    let (rows, duplicates) = dedup_filter(rows);
    if !duplicates.is_empty() {
        warn!(count = duplicates.len(), "dropped duplicate membership rows");
    }

    let (keep_mask, valid_item_count, valid_group_count) = {
        let items = valid_items(&rows, min_item_frequency);
        let groups = valid_groups(&rows, max_group_size);
        let mask: Vec<bool> = rows
            .iter()
            .map(|row| {
                items.contains(row.item_id.as_str()) && groups.contains(row.group_id.as_str())
            })
            .collect();
        (mask, items.len(), groups.len())
    };

    let mut kept = Vec::with_capacity(rows.len());
    let mut removed = Vec::new();
    for (row, keep) in rows.into_iter().zip(keep_mask) {
        if keep {
            kept.push(row);
        } else {
            removed.push(row);
        }
    }

    let report = FilterReport {
        input_rows,
        duplicate_rows: duplicates.len(),
        valid_items: valid_item_count,
        valid_groups: valid_group_count,
        kept_rows: kept.len(),
        removed_rows: removed.len(),
    };
    debug!(?report, "membership filter applied");

    FilterResult {
        kept,
        removed,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> Vec<ItemGroupMembership> {
        pairs
            .iter()
            .map(|(item, group)| ItemGroupMembership::new(*item, *group))
            .collect()
    }

    #[test]
    fn test_dedup_keeps_first() {
        let (kept, removed) = dedup_filter(rows(&[("a", "g1"), ("b", "g1"), ("a", "g1")]));
        assert_eq!(kept, rows(&[("a", "g1"), ("b", "g1")]));
        assert_eq!(removed, rows(&[("a", "g1")]));
    }

    #[test]
    fn test_valid_items_threshold() {
        let data = rows(&[("a", "g1"), ("a", "g2"), ("b", "g1")]);
        let items = valid_items(&data, 2);
        assert!(items.contains("a"));
        assert!(!items.contains("b"));
    }

    #[test]
    fn test_valid_groups_bounds() {
        let data = rows(&[
            ("a", "single"),
            ("a", "pair"),
            ("b", "pair"),
            ("a", "big"),
            ("b", "big"),
            ("c", "big"),
        ]);
        let groups = valid_groups(&data, 2);
        assert!(groups.contains("pair"));
        assert!(!groups.contains("single"));
        assert!(!groups.contains("big"));
    }

    #[test]
    fn test_filters_computed_on_unfiltered_relation() {
        // "a" reaches frequency 2 only through "solo", which is dropped as a
        // singleton group. "a" is still a valid item because the item filter
        // sees the unfiltered rows, and it is not re-checked afterwards.
        let data = rows(&[("a", "solo"), ("a", "g"), ("b", "g"), ("b", "h"), ("c", "h")]);
        let result = membership_filter(data, 2, 10);

        assert_eq!(result.report.valid_items, 2);
        assert_eq!(result.report.valid_groups, 2);
        assert_eq!(result.kept, rows(&[("a", "g"), ("b", "g"), ("b", "h")]));
        assert_eq!(result.removed, rows(&[("a", "solo"), ("c", "h")]));
    }

    #[test]
    fn test_report_counts_duplicates() {
        let data = rows(&[("a", "g"), ("b", "g"), ("a", "g")]);
        let result = membership_filter(data, 1, 10);
        assert_eq!(result.report.input_rows, 3);
        assert_eq!(result.report.duplicate_rows, 1);
        assert_eq!(result.report.kept_rows, 2);
        assert_eq!(result.report.removed_rows, 0);
    }

    #[test]
    fn test_empty_input() {
        let result = membership_filter(Vec::new(), 1, 10);
        assert!(result.kept.is_empty());
        assert_eq!(result.report, FilterReport::default());
    }
}
