//! Command-interface boundary.
//!
//! The chat-platform layer (or the CLI in `main`) hands raw track/stop
//! requests to the `Tracker`, which owns parsing, initial-snapshot seeding,
//! and scheduler startup. It holds no tracking state of its own; the
//! registry is the single source of truth.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use crate::market::filter::matching_listings;
use crate::market::models::{ItemId, UserId};
use crate::market::MarketFetcher;
use crate::tracking::registry::{TrackedItem, TrackingRegistry};
use crate::tracking::scheduler::PollScheduler;
use crate::tracking::TrackError;

pub struct Tracker {
    registry: Arc<TrackingRegistry>,
    fetcher: Arc<dyn MarketFetcher>,
    scheduler: Arc<PollScheduler>,
}

/// Summary of an accepted track request, for the caller to render.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingStarted {
    pub item_ids: Vec<ItemId>,
    pub qualities: Vec<Decimal>,
}

impl std::fmt::Display for TrackingStarted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tracking started for items {:?} with qualities {:?}",
            self.item_ids, self.qualities
        )
    }
}

impl Tracker {
    pub fn new(
        registry: Arc<TrackingRegistry>,
        fetcher: Arc<dyn MarketFetcher>,
        scheduler: Arc<PollScheduler>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            scheduler,
        }
    }

    /// Replace the tracked set with the items named in the request.
    ///
    /// Every item's baseline snapshot is fetched and filtered before the
    /// registry is touched, so the clear-and-reseed is one atomic install
    /// and the registry lock never spans a network call. The very first
    /// scheduled cycle therefore diffs against a real baseline instead of
    /// reporting every current listing as vanished.
    pub async fn start_tracking(
        &self,
        item_ids: &str,
        qualities: &str,
        owner: UserId,
    ) -> Result<TrackingStarted, TrackError> {
        let ids = parse_item_ids(item_ids)?;
        let desired = parse_qualities(qualities)?;

        let mut items = Vec::with_capacity(ids.len());
        for &item_id in &ids {
            let response = self
                .fetcher
                .fetch_item_market(item_id)
                .await
                .map_err(|source| TrackError::Fetch { item_id, source })?;
            let snapshot = matching_listings(&response, &desired);
            items.push(TrackedItem {
                item_id,
                desired_qualities: desired.clone(),
                owner,
                last_snapshot: snapshot,
            });
        }

        self.registry.install(items);
        self.scheduler.ensure_running();

        let started = TrackingStarted {
            item_ids: ids,
            qualities: desired.into_iter().collect(),
        };
        info!(owner, items = ?started.item_ids, qualities = ?started.qualities, "Tracking started");
        Ok(started)
    }

    /// Stop watching one item. `NotTracked` is a notice, not fatal.
    pub fn stop_tracking(&self, item_id: ItemId) -> Result<(), TrackError> {
        self.registry.stop_tracking(item_id).map(|item| {
            info!(item_id = item.item_id, "Tracking stopped");
        })
    }

    pub fn tracked_items(&self) -> Vec<TrackedItem> {
        self.registry.snapshot_all().1
    }
}

fn parse_item_ids(input: &str) -> Result<Vec<ItemId>, TrackError> {
    let ids = parse_list::<ItemId>(input, "item id")?;
    if ids.is_empty() {
        return Err(TrackError::InvalidInput("no item ids given".to_string()));
    }
    Ok(ids)
}

fn parse_qualities(input: &str) -> Result<BTreeSet<Decimal>, TrackError> {
    let qualities: BTreeSet<Decimal> =
        parse_list::<Decimal>(input, "quality")?.into_iter().collect();
    if qualities.is_empty() {
        return Err(TrackError::InvalidInput("no qualities given".to_string()));
    }
    Ok(qualities)
}

fn parse_list<T: FromStr>(input: &str, what: &str) -> Result<Vec<T>, TrackError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| TrackError::InvalidInput(format!("not a valid {what}: {token:?}")))
        })
        .collect()
}
