use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Torn marketplace item identifier.
pub type ItemId = u64;
/// Unique identifier of one listing instance on the market.
pub type ListingId = u64;
/// Chat-platform user identifier.
pub type UserId = u64;

/// The filtered view of one item's market at one point in time.
pub type Snapshot = HashMap<ListingId, ListingInfo>;

/// Secondary weapon attributes carried through unchanged for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionStats {
    pub damage: Decimal,
    pub accuracy: Decimal,
}

/// One market listing that matched a desired quality.
///
/// Immutable once built by the filter; superseded wholesale by the next
/// cycle's snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingInfo {
    pub quality: Decimal,
    pub stats: ConditionStats,
    pub price: u64,
}

/// What happened to a listing between two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Present in both the previous and current snapshot — still for sale.
    Persisted,
    /// Present previously, gone now — bought or withdrawn.
    Vanished,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persisted => write!(f, "persisted"),
            Self::Vanished => write!(f, "vanished"),
        }
    }
}

/// Payload handed to the notification boundary, one per classified listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEvent {
    pub item_id: ItemId,
    pub listing_id: ListingId,
    pub owner: UserId,
    pub kind: EventKind,
    pub listing: ListingInfo,
}

// === Raw Torn API response types ===
//
// The Torn API is a third-party surface and never guaranteed well-formed.
// Every level is `Option` so a missing or reshaped section degrades to an
// empty snapshot in the filter instead of a deserialization error.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemMarketResponse {
    pub itemmarket: Option<ItemMarketBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemMarketBody {
    pub listings: Option<Vec<RawListing>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawListing {
    pub price: Option<u64>,
    pub item_details: Option<RawItemDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawItemDetails {
    pub uid: Option<ListingId>,
    pub stats: Option<RawStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStats {
    pub quality: Option<Decimal>,
    pub damage: Option<Decimal>,
    pub accuracy: Option<Decimal>,
}
