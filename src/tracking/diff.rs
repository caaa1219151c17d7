//! Snapshot diff engine.
//!
//! Classifies every listing of the previous snapshot against the current
//! one: still present means "still for sale", gone means "bought or
//! withdrawn". Listings appearing for the first time are deliberately not
//! classified; they surface as `persisted` once seen in two consecutive
//! snapshots, or as `vanished` when they drop out.

use std::collections::HashSet;

use crate::market::models::{ListingId, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Present in both snapshots.
    pub persisted: HashSet<ListingId>,
    /// Present previously, absent now.
    pub vanished: HashSet<ListingId>,
}

/// Pure comparison of two snapshots. Empty maps are valid on either side.
pub fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> SnapshotDiff {
    let mut diff = SnapshotDiff::default();

    for listing_id in previous.keys() {
        if current.contains_key(listing_id) {
            diff.persisted.insert(*listing_id);
        } else {
            diff.vanished.insert(*listing_id);
        }
    }

    diff
}
