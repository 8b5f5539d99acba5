use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::Database;
use crate::store::{
    ChangeFeed, ChannelId, ChannelStatus, FeedChannel, FeedMessage, RawChange, StoreError, Table,
};

const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_warn};

/// Forward the changes of `table` from the shared broadcast into one
/// channel until it is released.
async fn forward_changes(
    id: ChannelId,
    table: Table,
    mut changes: broadcast::Receiver<RawChange>,
    messages: mpsc::UnboundedSender<FeedMessage>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                let _ = messages.send(FeedMessage::Status(ChannelStatus::Closed));
                break;
            }
            received = changes.recv() => match received {
                Ok(change) if change.table == table => {
                    if messages.send(FeedMessage::Change(change)).is_err() {
                        log_debug!("{id} receiver dropped; stopping forwarder");
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The subscriber's list can no longer be trusted.
                    log::warn!("{id} on {table} lagged behind by {skipped} changes");
                    let _ = messages.send(FeedMessage::Status(ChannelStatus::ChannelError));
                    cancel_token.cancelled().await;
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    log_warn!("{id} on {table}: change source closed");
                    let _ = messages.send(FeedMessage::Status(ChannelStatus::Closed));
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for Database {
    async fn subscribe(&self, table: Table) -> Result<FeedChannel, StoreError> {
        let id = ChannelId(self.next_channel_id.fetch_add(1, Ordering::Relaxed));
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        // Subscribe to the broadcast before acknowledging, so nothing
        // written after SUBSCRIBED can be missed.
        let changes = self.changes.subscribe();
        self.channels_guard().insert(id, cancel_token.clone());

        message_tx
            .send(FeedMessage::Status(ChannelStatus::Subscribed))
            .map_err(|_| StoreError::transport(format!("{id} closed during setup")))?;

        tokio::spawn(forward_changes(id, table, changes, message_tx, cancel_token));
        log_debug!("Opened {id} on {table}");

        Ok(FeedChannel {
            id,
            table,
            messages: message_rx,
        })
    }

    async fn unsubscribe(&self, channel: ChannelId) {
        if let Some(token) = self.channels_guard().remove(&channel) {
            token.cancel();
            log_debug!("Released {channel}");
        }
    }
}

impl Database {
    /// Channels currently open on the feed.
    pub fn open_channels(&self) -> usize {
        self.channels_guard().len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::store::{Query, StoreReader, StoreWriter};
    use crate::test_support::as_row;

    async fn next_message(channel: &mut FeedChannel) -> FeedMessage {
        tokio::time::timeout(Duration::from_secs(2), channel.messages.recv())
            .await
            .expect("timed out waiting for feed message")
            .expect("feed channel closed")
    }

    #[tokio::test]
    async fn writes_are_announced_on_their_table_only() {
        let db = Database::in_memory().unwrap();
        let mut stations = db.subscribe(Table::Stations).await.unwrap();
        let mut units = db.subscribe(Table::Units).await.unwrap();

        assert_eq!(
            next_message(&mut stations).await,
            FeedMessage::Status(ChannelStatus::Subscribed)
        );
        assert_eq!(
            next_message(&mut units).await,
            FeedMessage::Status(ChannelStatus::Subscribed)
        );

        let inserted = db
            .insert(
                Table::Stations,
                as_row(json!({ "id": "st-1", "name": "Dyeing", "count": 0 })),
            )
            .await
            .unwrap();
        db.update(Table::Stations, &json!("st-1"), as_row(json!({ "count": 3 })))
            .await
            .unwrap();
        db.delete(Table::Stations, &json!("st-1")).await.unwrap();

        let FeedMessage::Change(insert) = next_message(&mut stations).await else {
            panic!("expected insert change");
        };
        assert_eq!(insert.event_type, "INSERT");
        assert_eq!(insert.new, inserted);

        let FeedMessage::Change(update) = next_message(&mut stations).await else {
            panic!("expected update change");
        };
        assert_eq!(update.event_type, "UPDATE");
        assert_eq!(update.new["count"], json!(3));
        assert_eq!(update.old["count"], json!(0));

        let FeedMessage::Change(delete) = next_message(&mut stations).await else {
            panic!("expected delete change");
        };
        assert_eq!(delete.event_type, "DELETE");
        assert_eq!(delete.old["id"], json!("st-1"));

        assert!(units.messages.try_recv().is_err());
        assert!(db.select(&Query::table(Table::Stations)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_channel_once() {
        let db = Database::in_memory().unwrap();
        let mut channel = db.subscribe(Table::Movements).await.unwrap();
        assert_eq!(db.open_channels(), 1);

        db.unsubscribe(channel.id).await;
        db.unsubscribe(channel.id).await;
        assert_eq!(db.open_channels(), 0);

        assert_eq!(
            next_message(&mut channel).await,
            FeedMessage::Status(ChannelStatus::Subscribed)
        );
        assert_eq!(
            next_message(&mut channel).await,
            FeedMessage::Status(ChannelStatus::Closed)
        );
        assert!(channel.messages.recv().await.is_none());
    }
}
