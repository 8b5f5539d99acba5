use std::sync::Arc;

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::store::{FeedMessage, RawChange, Record, StoreClient, Table};

use super::{ChangeEvent, ConnectionState, SubscriptionStatus};

// Per-event logging for feed traffic.
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Receives the decoded changes of one table. Each event reaches exactly
/// one method, and the next event is not dispatched until it returns.
#[async_trait]
pub trait ChangeHandler<T: Record>: Send + Sync + 'static {
    async fn on_insert(&self, row: T);

    async fn on_update(&self, row: T);

    async fn on_delete(&self, id: T::Id);
}

/// Route a decoded event to the matching handler method.
pub async fn dispatch<T, H>(handler: &H, event: ChangeEvent<T>)
where
    T: Record,
    H: ChangeHandler<T> + ?Sized,
{
    match event {
        ChangeEvent::Created(row) => handler.on_insert(row).await,
        ChangeEvent::Modified(row) => handler.on_update(row).await,
        ChangeEvent::Removed(id) => handler.on_delete(id).await,
    }
}

/// A live subscription on one table.
///
/// Dropping the handle cancels the subscription; [`Subscription::unsubscribe`]
/// does the same and also waits for the feed channel to be released.
pub struct Subscription {
    table: Table,
    status: watch::Receiver<SubscriptionStatus>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn table(&self) -> Table {
        self.table
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    /// Tear the subscription down. Safe to call more than once.
    pub async fn unsubscribe(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                log::error!("Realtime {} subscription task failed: {err}", self.table);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Open a subscription on `T`'s table and feed its changes to `handler`.
///
/// Must be called from within a tokio runtime. The returned status starts
/// out `Connecting`; authentication and the feed handshake happen on the
/// spawned task.
pub fn subscribe<T, H>(client: &StoreClient, handler: Arc<H>) -> Subscription
where
    T: Record,
    H: ChangeHandler<T>,
{
    let table = T::TABLE;
    let (status_tx, status_rx) = watch::channel(SubscriptionStatus::new(table));
    let cancel_token = CancellationToken::new();

    let handle = tokio::spawn(run_subscription::<T, H>(
        client.clone(),
        handler,
        status_tx,
        cancel_token.clone(),
    ));

    Subscription {
        table,
        status: status_rx,
        cancel_token,
        handle: Some(handle),
    }
}

async fn run_subscription<T, H>(
    client: StoreClient,
    handler: Arc<H>,
    status_tx: watch::Sender<SubscriptionStatus>,
    cancel_token: CancellationToken,
) where
    T: Record,
    H: ChangeHandler<T>,
{
    let table = T::TABLE;
    log_info!("Setting up realtime subscription for {table}...");

    let current_user = tokio::select! {
        _ = cancel_token.cancelled() => {
            status_tx.send_modify(|status| status.state = ConnectionState::Closed);
            return;
        }
        result = client.auth().current_user() => result,
    };

    match current_user {
        Ok(Some(user)) => {
            log_info!("User authenticated for {table} realtime: {}", user.email);
        }
        Ok(None) => {
            log_error!("No authenticated user for {table} realtime");
            status_tx.send_modify(|status| {
                status.fail_authentication("No authenticated user".to_string())
            });
            return;
        }
        Err(err) => {
            log_error!("Auth error for {table} realtime: {err}");
            status_tx.send_modify(|status| {
                status.fail_authentication(format!("Authentication error: {err}"))
            });
            return;
        }
    }

    let subscribed = tokio::select! {
        _ = cancel_token.cancelled() => {
            status_tx.send_modify(|status| status.state = ConnectionState::Closed);
            return;
        }
        result = client.feed().subscribe(table) => result,
    };

    let mut channel = match subscribed {
        Ok(channel) => channel,
        Err(err) => {
            log_error!("Error setting up realtime for {table}: {err}");
            status_tx.send_modify(|status| {
                status.fail_setup(format!("Setup error for {table}: {err}"))
            });
            return;
        }
    };
    status_tx.send_modify(|status| status.error = None);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("Cleaning up realtime subscription for {table}...");
                break;
            }
            message = channel.messages.recv() => match message {
                Some(FeedMessage::Status(channel_status)) => {
                    log_info!("Realtime {table} subscription status: {channel_status:?}");
                    status_tx.send_modify(|status| status.apply_channel_status(channel_status));
                }
                Some(FeedMessage::Change(raw)) => {
                    handle_change::<T, H>(handler.as_ref(), raw, &status_tx).await;
                }
                None => {
                    log_warn!("Realtime {table} feed ended");
                    break;
                }
            }
        }
    }

    client.feed().unsubscribe(channel.id).await;
    status_tx.send_modify(|status| status.state = ConnectionState::Closed);
}

async fn handle_change<T, H>(
    handler: &H,
    raw: RawChange,
    status_tx: &watch::Sender<SubscriptionStatus>,
) where
    T: Record,
    H: ChangeHandler<T>,
{
    let table = T::TABLE;
    let event_type = raw.event_type.clone();

    match ChangeEvent::<T>::decode(raw) {
        Ok(Some(event)) => {
            log_debug!("Realtime {table} {} event received for {:?}", event.kind(), event.id());
            dispatch(handler, event).await;
        }
        Ok(None) => {
            log_warn!("Realtime {table} unknown event type: {event_type}");
        }
        Err(err) => {
            log_error!("Error handling realtime {table} change: {err}");
            status_tx.send_modify(|status| {
                status.error = Some(format!("Error handling {table} change: {err}"))
            });
        }
    }
}
