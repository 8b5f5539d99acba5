use std::sync::Arc;

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{LiveList, ViewState};
use crate::{
    derived::MovementFilter,
    models::Movement,
    realtime::{subscribe, ChangeEvent, ChangeHandler, Subscription, SubscriptionStatus},
    snapshot::SnapshotLoader,
    store::{SortOrder, StoreClient},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionsOptions {
    pub realtime: bool,
    /// Snapshot order by timestamp. Live inserts are always prepended.
    pub order: SortOrder,
}

impl Default for TransactionsOptions {
    fn default() -> Self {
        Self {
            realtime: true,
            order: SortOrder::Descending,
        }
    }
}

struct MovementHandler {
    list: Arc<LiveList<Movement>>,
}

#[async_trait]
impl ChangeHandler<Movement> for MovementHandler {
    async fn on_insert(&self, row: Movement) {
        self.list.apply(ChangeEvent::Created(row));
    }

    async fn on_update(&self, row: Movement) {
        self.list.apply(ChangeEvent::Modified(row));
    }

    async fn on_delete(&self, id: String) {
        self.list.apply(ChangeEvent::Removed(id));
    }
}

/// Live log of station-to-station movements.
pub struct TransactionsView {
    state: watch::Receiver<ViewState<Vec<Movement>>>,
    alive: CancellationToken,
    subscription: Option<Subscription>,
    load: Option<JoinHandle<()>>,
}

impl TransactionsView {
    pub fn mount(client: &StoreClient, options: TransactionsOptions) -> Self {
        let alive = CancellationToken::new();
        let (list, state) = LiveList::new("transactions", alive.clone());

        let subscription = options.realtime.then(|| {
            subscribe::<Movement, _>(client, Arc::new(MovementHandler { list: list.clone() }))
        });

        let loader = SnapshotLoader::new(client.clone());
        let load = tokio::spawn({
            let alive = alive.clone();
            async move {
                tokio::select! {
                    _ = alive.cancelled() => {}
                    result = loader.movements(options.order) => list.finish_load(result),
                }
            }
        });

        Self {
            state,
            alive,
            subscription,
            load: Some(load),
        }
    }

    pub fn state(&self) -> ViewState<Vec<Movement>> {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ViewState<Vec<Movement>>> {
        self.state.clone()
    }

    pub fn connection(&self) -> Option<SubscriptionStatus> {
        self.subscription.as_ref().map(Subscription::status)
    }

    pub fn watch_connection(&self) -> Option<watch::Receiver<SubscriptionStatus>> {
        self.subscription.as_ref().map(Subscription::watch_status)
    }

    pub fn search(&self, filter: &MovementFilter) -> Vec<Movement> {
        self.state
            .borrow()
            .ready()
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn unmount(mut self) {
        self.alive.cancel();
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
        if let Some(load) = self.load.take() {
            if let Err(err) = load.await {
                log::error!("Transactions load task failed: {err}");
            }
        }
    }
}

impl Drop for TransactionsView {
    fn drop(&mut self) {
        self.alive.cancel();
    }
}
