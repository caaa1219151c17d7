//! Polling scheduler.
//!
//! Drives one fetch → filter → diff → replace pass over every tracked item
//! per fixed interval and forwards the classified listings to the notifier.
//! The loop starts the first time tracking succeeds and stops only when
//! explicitly cancelled; an empty registry during a cycle is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::market::filter::matching_listings;
use crate::market::models::{EventKind, ListingEvent};
use crate::market::MarketFetcher;
use crate::monitoring::alerts::Notifier;
use crate::monitoring::health::HealthState;
use crate::tracking::diff::diff_snapshots;
use crate::tracking::registry::{TrackedItem, TrackingRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Running => write!(f, "RUNNING"),
        }
    }
}

/// Outcome of one pass over all tracked items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub items_polled: usize,
    pub persisted: usize,
    pub vanished: usize,
    pub failures: usize,
}

pub struct PollScheduler {
    registry: Arc<TrackingRegistry>,
    fetcher: Arc<dyn MarketFetcher>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    health: HealthState,
    cycle_number: AtomicU64,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollScheduler {
    pub fn new(
        registry: Arc<TrackingRegistry>,
        fetcher: Arc<dyn MarketFetcher>,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
        health: HealthState,
    ) -> Self {
        Self {
            registry,
            fetcher,
            notifier,
            poll_interval,
            health,
            cycle_number: AtomicU64::new(0),
            loop_handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        let guard = self.loop_handle.lock().expect("scheduler lock poisoned");
        match guard.as_ref() {
            Some(handle) if !handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Idle,
        }
    }

    /// Start the interval loop if it is not already running.
    ///
    /// Subsequent calls while running are no-ops, so repeated track requests
    /// never spawn a second loop instance. Items are polled sequentially
    /// within a cycle and missed ticks are skipped, so a slow cycle delays
    /// the next one instead of overlapping it.
    pub fn ensure_running(self: &Arc<Self>) {
        let mut guard = self.loop_handle.lock().expect("scheduler lock poisoned");
        if matches!(guard.as_ref(), Some(handle) if !handle.is_finished()) {
            return;
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // First tick fires one full interval from now; the track request
            // that started the loop has just seeded a fresh baseline.
            let start = Instant::now() + scheduler.poll_interval;
            let mut ticker = interval_at(start, scheduler.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let stats = scheduler.run_cycle().await;
                if stats.items_polled > 0 {
                    info!(
                        items = stats.items_polled,
                        persisted = stats.persisted,
                        vanished = stats.vanished,
                        failures = stats.failures,
                        "Cycle complete"
                    );
                }
            }
        });
        *guard = Some(handle);

        info!(
            every_s = self.poll_interval.as_secs(),
            "Market poll loop started"
        );
    }

    /// Abort the loop. Used at process shutdown; in-flight fetches are
    /// dropped with it.
    pub fn cancel(&self) {
        let mut guard = self.loop_handle.lock().expect("scheduler lock poisoned");
        if let Some(handle) = guard.take() {
            handle.abort();
            info!("Market poll loop cancelled");
        }
    }

    /// One pass over all tracked items, invocable directly by tests without
    /// waiting on the timer. A failed item never aborts the cycle for the
    /// others.
    pub async fn run_cycle(&self) -> CycleStats {
        let cycle = self.cycle_number.fetch_add(1, Ordering::Relaxed) + 1;
        let mut stats = CycleStats::default();

        let (generation, items) = self.registry.snapshot_all();
        for item in items {
            stats.items_polled += 1;
            match self.poll_item(&item, generation).await {
                Ok((persisted, vanished)) => {
                    stats.persisted += persisted;
                    stats.vanished += vanished;
                }
                Err(e) => {
                    stats.failures += 1;
                    warn!(
                        item_id = item.item_id,
                        error = %e,
                        "Item poll failed; retrying next cycle"
                    );
                }
            }
        }

        self.health
            .record_cycle(cycle, self.state(), self.registry.len())
            .await;
        stats
    }

    async fn poll_item(&self, item: &TrackedItem, generation: u64) -> Result<(usize, usize)> {
        let response = self.fetcher.fetch_item_market(item.item_id).await?;
        let current = matching_listings(&response, &item.desired_qualities);
        let diff = diff_snapshots(&item.last_snapshot, &current);

        // The tracked set may have been replaced or the item removed while
        // the fetch was in flight; in that case this cycle's whole result
        // for the item is stale and gets dropped, events included.
        if !self
            .registry
            .replace_snapshot(item.item_id, generation, current)
        {
            return Ok((0, 0));
        }

        // Events render the listing as last seen, from the previous snapshot.
        for (&listing_id, info) in &item.last_snapshot {
            let kind = if diff.persisted.contains(&listing_id) {
                EventKind::Persisted
            } else if diff.vanished.contains(&listing_id) {
                EventKind::Vanished
            } else {
                continue;
            };

            self.notifier
                .publish(&ListingEvent {
                    item_id: item.item_id,
                    listing_id,
                    owner: item.owner,
                    kind,
                    listing: info.clone(),
                })
                .await;
        }

        Ok((diff.persisted.len(), diff.vanished.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::models::{
        ConditionStats, ItemId, ItemMarketResponse, ListingId, ListingInfo,
    };
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::{BTreeSet, HashMap, VecDeque};

    /// Per-item queue of canned fetch outcomes; repeats the last one when
    /// the queue runs dry.
    #[derive(Default)]
    struct ScriptedFetcher {
        scripts: Mutex<HashMap<ItemId, VecDeque<Step>>>,
    }

    #[derive(Debug, Clone)]
    enum Step {
        Listings(Vec<ListingId>),
        Empty,
        Fail,
    }

    impl ScriptedFetcher {
        fn script(&self, item_id: ItemId, steps: &[Step]) {
            self.scripts
                .lock()
                .unwrap()
                .insert(item_id, steps.iter().cloned().collect());
        }
    }

    #[async_trait]
    impl MarketFetcher for ScriptedFetcher {
        async fn fetch_item_market(&self, item_id: ItemId) -> Result<ItemMarketResponse> {
            let step = {
                let mut scripts = self.scripts.lock().unwrap();
                let queue = scripts.entry(item_id).or_default();
                if queue.len() > 1 {
                    queue.pop_front().unwrap()
                } else {
                    queue.front().cloned().unwrap_or(Step::Empty)
                }
            };

            match step {
                Step::Fail => anyhow::bail!("scripted transport failure"),
                Step::Empty => Ok(ItemMarketResponse::default()),
                Step::Listings(ids) => {
                    let body = ids
                        .iter()
                        .map(|id| {
                            format!(
                                r#"{{"price": 1000, "item_details": {{"uid": {id},
                                    "stats": {{"quality": 110.5, "damage": 1.0, "accuracy": 2.0}}}}}}"#
                            )
                        })
                        .collect::<Vec<_>>()
                        .join(",");
                    let json = format!(r#"{{"itemmarket": {{"listings": [{body}]}}}}"#);
                    Ok(serde_json::from_str(&json).unwrap())
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<ListingEvent>>,
    }

    impl RecordingNotifier {
        fn events(&self) -> Vec<ListingEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn publish(&self, event: &ListingEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn tracked(item_id: ItemId, snapshot_ids: &[ListingId]) -> TrackedItem {
        TrackedItem {
            item_id,
            desired_qualities: [dec!(110.5)].into_iter().collect::<BTreeSet<_>>(),
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
                            price: 1000,
                        },
                    )
                })
                .collect(),
        }
    }

    fn build(
        fetcher: Arc<ScriptedFetcher>,
        notifier: Arc<RecordingNotifier>,
    ) -> (Arc<PollScheduler>, Arc<TrackingRegistry>) {
        let registry = Arc::new(TrackingRegistry::new());
        let scheduler = Arc::new(PollScheduler::new(
            registry.clone(),
            fetcher,
            notifier,
            Duration::from_secs(15),
            HealthState::new(),
        ));
        (scheduler, registry)
    }

    #[tokio::test]
    async fn persisted_then_vanished_across_two_cycles() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        // Item 1: listing 100 stays for one cycle, then disappears.
        fetcher.script(1, &[Step::Listings(vec![100]), Step::Empty]);
        fetcher.script(2, &[Step::Empty]);

        let (scheduler, registry) = build(fetcher, notifier.clone());
        registry.install(vec![tracked(1, &[100]), tracked(2, &[])]);

        let first = scheduler.run_cycle().await;
        assert_eq!(first.items_polled, 2);
        assert_eq!(first.persisted, 1);
        assert_eq!(first.vanished, 0);

        let second = scheduler.run_cycle().await;
        assert_eq!(second.persisted, 0);
        assert_eq!(second.vanished, 1);

        let events = notifier.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Persisted);
        assert_eq!(events[0].listing_id, 100);
        assert_eq!(events[1].kind, EventKind::Vanished);
        assert_eq!(events[1].item_id, 1);
        assert_eq!(events[1].owner, 42);
    }

    #[tokio::test]
    async fn failed_item_does_not_abort_the_cycle() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        fetcher.script(1, &[Step::Fail]);
        fetcher.script(2, &[Step::Listings(vec![200])]);

        let (scheduler, registry) = build(fetcher, notifier.clone());
        registry.install(vec![tracked(1, &[100]), tracked(2, &[200])]);

        let stats = scheduler.run_cycle().await;
        assert_eq!(stats.items_polled, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.persisted, 1);

        // The failed item keeps its previous snapshot for the next cycle.
        let kept = registry
            .snapshot_all()
            .1
            .into_iter()
            .find(|i| i.item_id == 1)
            .unwrap();
        assert!(kept.last_snapshot.contains_key(&100));

        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id, 2);
    }

    #[tokio::test]
    async fn empty_registry_cycle_is_a_no_op() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let (scheduler, _registry) = build(fetcher, notifier.clone());

        let stats = scheduler.run_cycle().await;
        assert_eq!(stats, CycleStats::default());
        assert!(notifier.events().is_empty());
    }

    #[tokio::test]
    async fn newly_appeared_listings_are_not_reported() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        fetcher.script(1, &[Step::Listings(vec![300])]);

        let (scheduler, registry) = build(fetcher, notifier.clone());
        registry.install(vec![tracked(1, &[])]);

        let stats = scheduler.run_cycle().await;
        assert_eq!(stats.persisted, 0);
        assert_eq!(stats.vanished, 0);
        assert!(notifier.events().is_empty());

        // Once seen, the listing persists on the next cycle.
        let stats = scheduler.run_cycle().await;
        assert_eq!(stats.persisted, 1);
    }

    /// Parks every fetch until released, signalling entry first.
    struct GatedFetcher {
        entered: Arc<tokio::sync::Semaphore>,
        release: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl MarketFetcher for GatedFetcher {
        async fn fetch_item_market(&self, _item_id: ItemId) -> Result<ItemMarketResponse> {
            self.entered.add_permits(1);
            self.release.acquire().await.unwrap().forget();
            Ok(ItemMarketResponse::default())
        }
    }

    #[tokio::test]
    async fn stale_cycle_cannot_clobber_a_reseeded_item() {
        let entered = Arc::new(tokio::sync::Semaphore::new(0));
        let release = Arc::new(tokio::sync::Semaphore::new(0));
        let fetcher = Arc::new(GatedFetcher {
            entered: entered.clone(),
            release: release.clone(),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = Arc::new(TrackingRegistry::new());
        let scheduler = Arc::new(PollScheduler::new(
            registry.clone(),
            fetcher,
            notifier.clone(),
            Duration::from_secs(15),
            HealthState::new(),
        ));

        registry.install(vec![tracked(1, &[100])]);

        let cycle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run_cycle().await }
        });

        // Wait until the cycle is parked inside item 1's fetch, then
        // re-track the same item id with a freshly seeded baseline.
        entered.acquire().await.unwrap().forget();
        registry.install(vec![tracked(1, &[200])]);

        release.add_permits(1);
        let stats = cycle.await.unwrap();

        // The stale cycle's empty market result is dropped wholesale: the
        // new baseline survives and nothing is reported as vanished.
        assert_eq!(stats.persisted, 0);
        assert_eq!(stats.vanished, 0);
        let (_, items) = registry.snapshot_all();
        assert!(items[0].last_snapshot.contains_key(&200));
        assert!(notifier.events().is_empty());
    }

    #[tokio::test]
    async fn ensure_running_starts_exactly_one_loop() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let (scheduler, _registry) = build(fetcher, notifier);

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        scheduler.ensure_running();
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.ensure_running();
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.cancel();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
