pub mod diff;
pub mod registry;
pub mod scheduler;

use thiserror::Error;

use crate::market::models::ItemId;

/// Errors surfaced synchronously to the command boundary.
///
/// Fetch failures during scheduled cycles are never represented here; they
/// are logged per item and the next cycle retries naturally.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Malformed track request: unparseable or empty ids/qualities.
    #[error("invalid track request: {0}")]
    InvalidInput(String),

    /// Stop request for an item that is not currently tracked.
    #[error("item {0} is not being tracked")]
    NotTracked(ItemId),

    /// Market fetch failed while seeding the initial snapshot.
    #[error("market fetch failed for item {item_id}")]
    Fetch {
        item_id: ItemId,
        #[source]
        source: anyhow::Error,
    },
}
