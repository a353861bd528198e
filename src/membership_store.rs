//! Thread-safe in-memory membership index.
//!
//! Uses DashMap so several loaders can stream (item, group) batches into the
//! same store without a global lock. The store deduplicates on insert and
//! hands the engine a deterministic snapshot.

use ahash::AHashSet;
use dashmap::DashMap;
use rayon::prelude::*;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::filters::ItemGroupMembership;

/// Store-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub groups: usize,
    pub memberships: usize,
}

/// Concurrent group_id → item set index.
///
/// Usage:
///   let store = MembershipStore::new();
///   store.insert("item", "group");
///   let outcome = engine.run_store(&store)?;
#[derive(Debug, Clone, Default)]
pub struct MembershipStore {
    items_by_group: Arc<DashMap<String, AHashSet<String>>>,
}

impl MembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing rows.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = ItemGroupMembership>,
    {
        let store = Self::new();
        for row in rows {
            store.insert(row.item_id, row.group_id);
        }
        store
    }

    /// Record one membership. Returns false if it was already present.
    pub fn insert(&self, item_id: impl Into<String>, group_id: impl Into<String>) -> bool {
        self.items_by_group
            .entry(group_id.into())
            .or_default()
            .insert(item_id.into())
    }

    /// Insert parallel columns of item and group ids.
    ///
    /// Returns the number of memberships that were new.
    ///
    /// # Errors
    ///
    /// [`PipelineError::LengthMismatch`] if the columns differ in length;
    /// nothing is inserted in that case.
    pub fn insert_batch(&self, item_ids: Vec<String>, group_ids: Vec<String>) -> Result<usize> {
        if item_ids.len() != group_ids.len() {
            return Err(PipelineError::LengthMismatch {
                left: "item_ids",
                left_len: item_ids.len(),
                right: "group_ids",
                right_len: group_ids.len(),
            });
        }

        let inserted = item_ids
            .into_par_iter()
            .zip(group_ids.into_par_iter())
            .filter(|(item, group)| self.insert(item.clone(), group.clone()))
            .count();
        Ok(inserted)
    }

    /// Items of one group, sorted by id.
    pub fn group_items(&self, group_id: &str) -> Vec<String> {
        match self.items_by_group.get(group_id) {
            Some(entry) => {
                let mut items: Vec<String> = entry.value().iter().cloned().collect();
                items.sort_unstable();
                items
            }
            None => Vec::new(),
        }
    }

    pub fn contains(&self, item_id: &str, group_id: &str) -> bool {
        self.items_by_group
            .get(group_id)
            .map(|entry| entry.value().contains(item_id))
            .unwrap_or(false)
    }

    /// All memberships ordered by (item_id, group_id).
    pub fn snapshot(&self) -> Vec<ItemGroupMembership> {
        let mut rows: Vec<ItemGroupMembership> = self
            .items_by_group
            .iter()
            .flat_map(|entry| {
                let group = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(|item| ItemGroupMembership::new(item.clone(), group.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        rows.sort_unstable();
        rows
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            groups: self.items_by_group.len(),
            memberships: self.items_by_group.iter().map(|e| e.value().len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items_by_group.is_empty()
    }

    pub fn clear(&self) {
        self.items_by_group.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_dedups() {
        let store = MembershipStore::new();
        assert!(store.insert("a", "g1"));
        assert!(!store.insert("a", "g1"));
        assert!(store.insert("b", "g1"));
        assert_eq!(
            store.stats(),
            StoreStats {
                groups: 1,
                memberships: 2
            }
        );
        assert!(store.contains("a", "g1"));
        assert!(!store.contains("a", "g2"));
    }

    #[test]
    fn test_insert_batch_counts_new_rows() {
        let store = MembershipStore::new();
        store.insert("a", "g1");
        let inserted = store
            .insert_batch(
                vec!["a".into(), "b".into(), "c".into(), "b".into()],
                vec!["g1".into(), "g1".into(), "g2".into(), "g1".into()],
            )
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.group_items("g1"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.group_items("g2"), vec!["c".to_string()]);
        assert!(store.group_items("missing").is_empty());
    }

    #[test]
    fn test_insert_batch_length_mismatch() {
        let store = MembershipStore::new();
        let err = store
            .insert_batch(vec!["a".into()], vec![])
            .unwrap_err();
        assert!(matches!(err, PipelineError::LengthMismatch { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let store = MembershipStore::from_rows(vec![
            ItemGroupMembership::new("b", "g2"),
            ItemGroupMembership::new("a", "g2"),
            ItemGroupMembership::new("a", "g1"),
        ]);
        assert_eq!(
            store.snapshot(),
            vec![
                ItemGroupMembership::new("a", "g1"),
                ItemGroupMembership::new("a", "g2"),
                ItemGroupMembership::new("b", "g2"),
            ]
        );
    }

    #[test]
    fn test_concurrent_inserts() {
        let store = MembershipStore::new();
        std::thread::scope(|scope| {
            for t in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..100 {
                        store.insert(format!("item{i}"), format!("group{}", t % 2));
                    }
                });
            }
        });
        assert_eq!(
            store.stats(),
            StoreStats {
                groups: 2,
                memberships: 200
            }
        );

        store.clear();
        assert!(store.is_empty());
    }
}
