use std::sync::Arc;

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::{publish_load, ViewState};
use crate::{
    models::{Movement, Station, ThroughputCounter, Unit},
    realtime::{subscribe, ChangeHandler, Subscription, SubscriptionStatus},
    snapshot::{DashboardSnapshot, SnapshotLoader},
    store::{Record, StoreClient, Table},
};

const WHAT: &str = "dashboard data";

/// Turns every change of a table into a refetch request.
struct RefetchOnChange {
    requests: mpsc::UnboundedSender<Table>,
}

impl RefetchOnChange {
    fn request(&self, table: Table) {
        if self.requests.send(table).is_err() {
            log::debug!("Dashboard refetch worker gone; dropping {table} change");
        }
    }
}

#[async_trait]
impl<T: Record> ChangeHandler<T> for RefetchOnChange {
    async fn on_insert(&self, _row: T) {
        self.request(T::TABLE);
    }

    async fn on_update(&self, _row: T) {
        self.request(T::TABLE);
    }

    async fn on_delete(&self, _id: T::Id) {
        self.request(T::TABLE);
    }
}

/// Loads the dashboard once per request, one request at a time.
async fn run_refetch_worker(
    loader: SnapshotLoader,
    state: watch::Sender<ViewState<DashboardSnapshot>>,
    mut requests: mpsc::UnboundedReceiver<Table>,
    alive: CancellationToken,
) {
    let mut initial = true;
    loop {
        let trigger = tokio::select! {
            biased;
            _ = alive.cancelled() => break,
            request = requests.recv() => request,
        };
        let Some(table) = trigger else { break };
        if !initial {
            log::debug!("Refetching dashboard after {table} change");
        }

        let result = tokio::select! {
            biased;
            _ = alive.cancelled() => break,
            result = loader.dashboard() => result,
        };

        match result {
            Err(err) if !initial && state.borrow().ready().is_some() => {
                log::error!("Error refreshing {WHAT}, keeping last snapshot: {err}");
            }
            result => publish_load(&state, &alive, WHAT, result),
        }
        initial = false;
    }
}

/// Station counts, production summary and WIP, refetched on every change
/// to any of the four tables.
pub struct DashboardView {
    state: watch::Receiver<ViewState<DashboardSnapshot>>,
    alive: CancellationToken,
    subscriptions: Vec<Subscription>,
    worker: Option<JoinHandle<()>>,
}

impl DashboardView {
    pub fn mount(client: &StoreClient, realtime: bool) -> Self {
        let alive = CancellationToken::new();
        let (state_tx, state) = watch::channel(ViewState::Loading);
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        // The initial load goes through the same queue as refetches.
        if requests_tx.send(Table::Units).is_err() {
            log::debug!("Dashboard refetch queue closed before the initial load");
        }

        let subscriptions = if realtime {
            let handler = Arc::new(RefetchOnChange {
                requests: requests_tx,
            });
            vec![
                subscribe::<Unit, _>(client, handler.clone()),
                subscribe::<Station, _>(client, handler.clone()),
                subscribe::<Movement, _>(client, handler.clone()),
                subscribe::<ThroughputCounter, _>(client, handler),
            ]
        } else {
            Vec::new()
        };

        let worker = tokio::spawn(run_refetch_worker(
            SnapshotLoader::new(client.clone()),
            state_tx,
            requests_rx,
            alive.clone(),
        ));

        Self {
            state,
            alive,
            subscriptions,
            worker: Some(worker),
        }
    }

    pub fn state(&self) -> ViewState<DashboardSnapshot> {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ViewState<DashboardSnapshot>> {
        self.state.clone()
    }

    pub fn connection(&self, table: Table) -> Option<SubscriptionStatus> {
        self.subscriptions
            .iter()
            .find(|subscription| subscription.table() == table)
            .map(Subscription::status)
    }

    /// Live when the units, stations and movements feeds are all connected.
    pub fn live_updates_enabled(&self) -> bool {
        [Table::Units, Table::Stations, Table::Movements]
            .into_iter()
            .all(|table| {
                self.connection(table)
                    .is_some_and(|status| status.is_connected())
            })
    }

    pub async fn unmount(mut self) {
        self.alive.cancel();
        for subscription in self.subscriptions.iter_mut() {
            subscription.unsubscribe().await;
        }
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                log::error!("Dashboard refetch worker failed: {err}");
            }
        }
    }
}

impl Drop for DashboardView {
    fn drop(&mut self) {
        self.alive.cancel();
    }
}
