use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{Row, StoreError, Table};

/// Transport-level status reported by a change-feed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

/// A change notification exactly as the feed delivers it.
///
/// `event_type` is one of `INSERT`, `UPDATE` or `DELETE`; `new` carries the
/// row after an insert/update and `old` the prior row of a delete. Decoding
/// into typed events happens in the realtime layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub table: Table,
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(default)]
    pub new: Row,
    #[serde(default)]
    pub old: Row,
}

impl RawChange {
    pub fn insert(table: Table, new: Row) -> Self {
        Self {
            table,
            event_type: "INSERT".into(),
            new,
            old: Row::new(),
        }
    }

    pub fn update(table: Table, new: Row, old: Row) -> Self {
        Self {
            table,
            event_type: "UPDATE".into(),
            new,
            old,
        }
    }

    pub fn delete(table: Table, old: Row) -> Self {
        Self {
            table,
            event_type: "DELETE".into(),
            new: Row::new(),
            old,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Status(ChannelStatus),
    Change(RawChange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// One open subscription on a single table.
#[derive(Debug)]
pub struct FeedChannel {
    pub id: ChannelId,
    pub table: Table,
    pub messages: mpsc::UnboundedReceiver<FeedMessage>,
}

/// Push-based row change notifications, one channel per table.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, table: Table) -> Result<FeedChannel, StoreError>;

    /// Release a channel. Unknown or already released ids are ignored.
    async fn unsubscribe(&self, channel: ChannelId);
}
