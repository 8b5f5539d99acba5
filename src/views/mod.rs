//! Views: a snapshot load plus live subscriptions, published over `watch`.
//!
//! A view owns its list and its subscriptions. Unmounting cancels the
//! view's aliveness token, which tears the subscriptions down and makes any
//! snapshot that completes afterwards a no-op.

pub mod dashboard;
pub mod tracker;
pub mod transactions;
pub mod unit_detail;

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    realtime::ChangeEvent,
    reconcile::{apply_in_place, Identified, ReconcileOutcome},
    store::StoreError,
};

pub use dashboard::DashboardView;
pub use tracker::{TrackerOptions, TrackerView};
pub use transactions::{TransactionsOptions, TransactionsView};
pub use unit_detail::UnitDetailView;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "camelCase")]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> ViewState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ViewState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ViewState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Publish the outcome of a snapshot load unless the view is gone.
fn publish_load<T>(
    state: &watch::Sender<ViewState<T>>,
    alive: &CancellationToken,
    what: &str,
    result: Result<T, StoreError>,
) {
    if alive.is_cancelled() {
        log::debug!("Discarding {what} snapshot for an unmounted view");
        return;
    }
    match result {
        Ok(value) => {
            state.send_replace(ViewState::Ready(value));
        }
        Err(err) => {
            log::error!("Error fetching {what}: {err}");
            state.send_replace(ViewState::Failed(format!("Failed to load {what}")));
        }
    }
}

/// A list fed by one snapshot and then by reconciled change events.
///
/// Events that arrive while the snapshot is still loading are held back and
/// replayed onto it, so a change committed between the read and its arrival
/// is not lost. After a failed load events are dropped.
pub(crate) struct LiveList<T: Identified> {
    what: &'static str,
    state: watch::Sender<ViewState<Vec<T>>>,
    pending: Mutex<Vec<ChangeEvent<T>>>,
    alive: CancellationToken,
}

impl<T> LiveList<T>
where
    T: Identified + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        what: &'static str,
        alive: CancellationToken,
    ) -> (Arc<Self>, watch::Receiver<ViewState<Vec<T>>>) {
        let (state, receiver) = watch::channel(ViewState::Loading);
        let list = Arc::new(Self {
            what,
            state,
            pending: Mutex::new(Vec::new()),
            alive,
        });
        (list, receiver)
    }

    pub(crate) fn apply(&self, event: ChangeEvent<T>) {
        if self.alive.is_cancelled() {
            return;
        }

        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let what = self.what;
        let mut deferred = None;
        self.state.send_if_modified(|state| match state {
            ViewState::Ready(list) => {
                let outcome = apply_in_place(list, event.clone());
                if !outcome.changed() {
                    log::debug!("{what}: {} event ignored ({outcome:?})", event.kind());
                }
                outcome.changed()
            }
            ViewState::Loading => {
                deferred = Some(event.clone());
                false
            }
            ViewState::Failed(_) => false,
        });

        if let Some(event) = deferred {
            pending.push(event);
        }
    }

    pub(crate) fn finish_load(&self, result: Result<Vec<T>, StoreError>) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let replay = std::mem::take(&mut *pending);

        let result = result.map(|mut list| {
            for event in replay {
                let outcome: ReconcileOutcome = apply_in_place(&mut list, event);
                log::debug!("{}: replayed event ({outcome:?})", self.what);
            }
            list
        });
        publish_load(&self.state, &self.alive, self.what, result);
    }

    /// Mutate every row; subscribers are notified when `f` reports a change.
    pub(crate) fn update_all(&self, mut f: impl FnMut(&mut T) -> bool) {
        if self.alive.is_cancelled() {
            return;
        }
        self.state.send_if_modified(|state| match state {
            ViewState::Ready(list) => list.iter_mut().fold(false, |changed, row| f(row) || changed),
            _ => false,
        });
    }
}
