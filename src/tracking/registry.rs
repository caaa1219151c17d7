//! The mutable set of currently tracked items.
//!
//! Single source of truth for what the scheduler watches. All mutation goes
//! through this API; the lock is held only for structural updates, never
//! across network calls, so a track request can never interleave with an
//! in-flight cycle's snapshot replacement mid-update.
//!
//! Every `install` bumps a generation counter. A cycle carries the
//! generation it read, and a replacement from a superseded generation is
//! dropped even when the same item id was re-tracked in the meantime, so a
//! stale cycle can never mix pre- and post-clear state or clobber a freshly
//! seeded baseline.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use rust_decimal::Decimal;
use tracing::debug;

use crate::market::models::{ItemId, Snapshot, UserId};
use crate::tracking::TrackError;

/// One item under watch, owned exclusively by the registry.
#[derive(Debug, Clone)]
pub struct TrackedItem {
    pub item_id: ItemId,
    pub desired_qualities: BTreeSet<Decimal>,
    pub owner: UserId,
    /// Most recent filtered view; seeded before the item becomes visible
    /// to the scheduler, so the first cycle has a baseline to diff against.
    pub last_snapshot: Snapshot,
}

#[derive(Debug, Default)]
struct Inner {
    /// Bumped on every `install`; identifies which tracked set a cycle's
    /// results belong to.
    generation: u64,
    items: HashMap<ItemId, TrackedItem>,
}

#[derive(Debug, Default)]
pub struct TrackingRegistry {
    inner: Mutex<Inner>,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the entire tracked set.
    ///
    /// Only one tracked set is ever active: a new track request clears all
    /// previous items and their snapshots in the same critical section and
    /// advances the generation, invalidating any cycle still in flight
    /// against the old set.
    pub fn install(&self, items: Vec<TrackedItem>) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        inner.generation += 1;
        inner.items.clear();
        for item in items {
            inner.items.insert(item.item_id, item);
        }
    }

    /// Remove one item; `NotTracked` is a notice for the caller, not fatal.
    pub fn stop_tracking(&self, item_id: ItemId) -> Result<TrackedItem, TrackError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        inner
            .items
            .remove(&item_id)
            .ok_or(TrackError::NotTracked(item_id))
    }

    /// Cloned read view plus the generation it belongs to, consumed once
    /// per scheduler cycle.
    pub fn snapshot_all(&self) -> (u64, Vec<TrackedItem>) {
        let inner = self.inner.lock().expect("registry lock poisoned");
        (inner.generation, inner.items.values().cloned().collect())
    }

    /// Scheduler-only update of one item's last snapshot after a diff pass.
    ///
    /// Returns whether the replacement was stored. A result from a
    /// superseded generation, or for an item that was concurrently removed,
    /// is simply dropped: the caller must discard its diff with it.
    pub fn replace_snapshot(
        &self,
        item_id: ItemId,
        generation: u64,
        new_snapshot: Snapshot,
    ) -> bool {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if inner.generation != generation {
            debug!(
                item_id,
                generation,
                current = inner.generation,
                "Snapshot from a superseded tracked set dropped"
            );
            return false;
        }
        match inner.items.get_mut(&item_id) {
            Some(item) => {
                item.last_snapshot = new_snapshot;
                true
            }
            None => {
                debug!(item_id, "Snapshot for untracked item dropped");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::models::{ConditionStats, ListingInfo};
    use rust_decimal_macros::dec;

    fn item(item_id: ItemId, snapshot_ids: &[u64]) -> TrackedItem {
        TrackedItem {
            item_id,
            desired_qualities: [dec!(110.5)].into_iter().collect(),
            owner: 42,
            last_snapshot: snapshot_ids
                .iter()
                .map(|&id| {
                    (
                        id,
                        ListingInfo {
                            quality: dec!(110.5),
                            stats: ConditionStats {
                                damage: dec!(1.0),
                                accuracy: dec!(2.0),
                            },
                            price: 100,
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn install_replaces_previous_set() {
        let registry = TrackingRegistry::new();
        registry.install(vec![item(1, &[]), item(2, &[])]);
        assert_eq!(registry.len(), 2);

        registry.install(vec![item(3, &[])]);
        assert_eq!(registry.len(), 1);
        let (_, items) = registry.snapshot_all();
        assert_eq!(items[0].item_id, 3);
    }

    #[test]
    fn install_advances_the_generation() {
        let registry = TrackingRegistry::new();
        registry.install(vec![item(1, &[])]);
        let (first, _) = registry.snapshot_all();
        registry.install(vec![item(1, &[])]);
        let (second, _) = registry.snapshot_all();
        assert!(second > first);
    }

    #[test]
    fn stop_tracking_unknown_item_fails_and_leaves_state() {
        let registry = TrackingRegistry::new();
        registry.install(vec![item(1, &[])]);

        let err = registry.stop_tracking(99).unwrap_err();
        assert!(matches!(err, TrackError::NotTracked(99)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stop_tracking_removes_item() {
        let registry = TrackingRegistry::new();
        registry.install(vec![item(1, &[]), item(2, &[])]);

        let removed = registry.stop_tracking(1).unwrap();
        assert_eq!(removed.item_id, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn replace_snapshot_is_idempotent() {
        let registry = TrackingRegistry::new();
        registry.install(vec![item(1, &[10])]);
        let (generation, _) = registry.snapshot_all();

        let new_snapshot: Snapshot = item(1, &[11]).last_snapshot;
        assert!(registry.replace_snapshot(1, generation, new_snapshot.clone()));
        let after_first = registry.snapshot_all().1[0].last_snapshot.clone();

        assert!(registry.replace_snapshot(1, generation, new_snapshot));
        let after_second = registry.snapshot_all().1[0].last_snapshot.clone();
        assert_eq!(after_first, after_second);
        assert!(after_second.contains_key(&11));
    }

    #[test]
    fn replace_snapshot_after_removal_is_dropped() {
        let registry = TrackingRegistry::new();
        registry.install(vec![item(1, &[10])]);
        let (generation, _) = registry.snapshot_all();
        registry.stop_tracking(1).unwrap();

        assert!(!registry.replace_snapshot(1, generation, Snapshot::new()));
        assert!(registry.is_empty());
    }

    #[test]
    fn replace_snapshot_from_superseded_generation_is_dropped() {
        let registry = TrackingRegistry::new();
        registry.install(vec![item(1, &[10])]);
        let (stale_generation, _) = registry.snapshot_all();

        // The same item id is re-tracked with a fresh baseline.
        registry.install(vec![item(1, &[20])]);

        assert!(!registry.replace_snapshot(1, stale_generation, Snapshot::new()));
        let (_, items) = registry.snapshot_all();
        assert!(items[0].last_snapshot.contains_key(&20));
    }
}
