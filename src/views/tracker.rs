use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{sync::watch, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use super::{LiveList, ViewState};
use crate::{
    derived::UnitFilter,
    models::Unit,
    realtime::{subscribe, ChangeEvent, ChangeHandler, Subscription, SubscriptionStatus},
    snapshot::{SnapshotLoader, TrackedUnit},
    store::StoreClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerOptions {
    pub realtime: bool,
    /// Re-derive every duration label this often. `None` disables the ticker.
    pub auto_refresh: Option<Duration>,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            realtime: true,
            auto_refresh: Some(Duration::from_secs(60)),
        }
    }
}

struct TrackerHandler {
    list: Arc<LiveList<TrackedUnit>>,
    loader: SnapshotLoader,
}

#[async_trait]
impl ChangeHandler<Unit> for TrackerHandler {
    async fn on_insert(&self, unit: Unit) {
        // A brand new unit has not moved yet.
        let row = TrackedUnit::new(unit, None, Utc::now());
        self.list.apply(ChangeEvent::Created(row));
    }

    async fn on_update(&self, unit: Unit) {
        let arrival = match self.loader.latest_arrival(&unit.code, &unit.station).await {
            Ok(arrival) => arrival,
            Err(err) => {
                log::warn!(
                    "Could not read latest arrival of {} at {}: {err}",
                    unit.code,
                    unit.station
                );
                None
            }
        };
        let row = TrackedUnit::new(unit, arrival.as_ref(), Utc::now());
        self.list.apply(ChangeEvent::Modified(row));
    }

    async fn on_delete(&self, id: String) {
        self.list.apply(ChangeEvent::Removed(id));
    }
}

fn spawn_refresh_ticker(
    list: Arc<LiveList<TrackedUnit>>,
    period: Duration,
    alive: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        // The first tick completes immediately; the snapshot is fresh anyway.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = alive.cancelled() => break,
                _ = interval.tick() => {
                    let now = Utc::now();
                    list.update_all(|row| row.refresh(now));
                }
            }
        }
    })
}

/// Live list of every unit with its dwell time at the current station.
pub struct TrackerView {
    state: watch::Receiver<ViewState<Vec<TrackedUnit>>>,
    alive: CancellationToken,
    subscription: Option<Subscription>,
    tasks: Vec<JoinHandle<()>>,
}

impl TrackerView {
    pub fn mount(client: &StoreClient, options: TrackerOptions) -> Self {
        let alive = CancellationToken::new();
        let (list, state) = LiveList::new("sarees", alive.clone());
        let loader = SnapshotLoader::new(client.clone());

        let subscription = options.realtime.then(|| {
            let handler = Arc::new(TrackerHandler {
                list: list.clone(),
                loader: loader.clone(),
            });
            subscribe::<Unit, _>(client, handler)
        });

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn({
            let list = list.clone();
            let alive = alive.clone();
            async move {
                tokio::select! {
                    _ = alive.cancelled() => {}
                    result = loader.tracker(Utc::now()) => list.finish_load(result),
                }
            }
        }));

        if let Some(period) = options.auto_refresh {
            tasks.push(spawn_refresh_ticker(list, period, alive.clone()));
        }

        Self {
            state,
            alive,
            subscription,
            tasks,
        }
    }

    pub fn state(&self) -> ViewState<Vec<TrackedUnit>> {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ViewState<Vec<TrackedUnit>>> {
        self.state.clone()
    }

    /// Status of the live feed; `None` when realtime is disabled.
    pub fn connection(&self) -> Option<SubscriptionStatus> {
        self.subscription.as_ref().map(Subscription::status)
    }

    pub fn watch_connection(&self) -> Option<watch::Receiver<SubscriptionStatus>> {
        self.subscription.as_ref().map(Subscription::watch_status)
    }

    /// Loaded rows matching `filter`, in list order.
    pub fn search(&self, filter: &UnitFilter) -> Vec<TrackedUnit> {
        self.state
            .borrow()
            .ready()
            .map(|rows| {
                rows.iter()
                    .filter(|row| filter.matches(&row.unit))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn unmount(mut self) {
        self.alive.cancel();
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                log::error!("Tracker task failed: {err}");
            }
        }
    }
}

impl Drop for TrackerView {
    fn drop(&mut self) {
        self.alive.cancel();
    }
}
