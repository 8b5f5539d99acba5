//! Fakes and helpers shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Notify};

use crate::{
    db::Database,
    store::{
        AuthProvider, AuthSession, AuthUser, ChangeFeed, ChannelId, ChannelStatus, Credentials,
        FeedChannel, FeedMessage, Filter, Query, RawChange, Row, StoreClient, StoreError,
        StoreReader, Table,
    },
};

pub fn as_row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn unit_row(id: &str, code: &str, station: &str) -> Row {
    as_row(json!({
        "id": id,
        "saree_id": code,
        "article_number": "ART-7",
        "length": "6.3m",
        "weaver_name": "Lakshmi",
        "color": "Maroon",
        "design": null,
        "current_station": station,
        "status": "In Progress",
        "progress": 40,
        "created_at": "2024-05-01T08:00:00Z",
        "updated_at": "2024-05-01T08:00:00Z",
    }))
}

pub fn movement_row(id: &str, code: &str, from: &str, to: &str, at: &str) -> Row {
    as_row(json!({
        "id": id,
        "saree_id": code,
        "from_station": from,
        "to_station": to,
        "timestamp": at,
        "created_at": at,
    }))
}

/// Wait until the watched value satisfies `predicate`, failing the test
/// after five seconds.
pub async fn wait_until<T, F>(receiver: &mut watch::Receiver<T>, predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), receiver.wait_for(predicate))
        .await
        .expect("timed out waiting for watched value")
        .expect("watch sender dropped")
        .clone()
}

#[derive(Default)]
struct ScriptedFeedInner {
    next_id: u64,
    open: HashMap<ChannelId, (Table, mpsc::UnboundedSender<FeedMessage>)>,
    subscribe_calls: usize,
    unsubscribed: Vec<ChannelId>,
    fail_with: Option<StoreError>,
}

/// A change feed driven by the test: statuses and changes are pushed by
/// hand to every open channel of a table.
#[derive(Default)]
pub struct ScriptedFeed {
    inner: Mutex<ScriptedFeedInner>,
    subscribed: Notify,
}

impl ScriptedFeed {
    pub fn failing(err: StoreError) -> Self {
        let feed = Self::default();
        feed.inner.lock().unwrap().fail_with = Some(err);
        feed
    }

    pub async fn wait_for_subscribers(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.subscribed.notified();
                if self.inner.lock().unwrap().open.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for feed subscribers");
    }

    fn push(&self, table: Table, message: FeedMessage) {
        let inner = self.inner.lock().unwrap();
        for (channel_table, sender) in inner.open.values() {
            if *channel_table == table {
                let _ = sender.send(message.clone());
            }
        }
    }

    pub fn push_status(&self, table: Table, status: ChannelStatus) {
        self.push(table, FeedMessage::Status(status));
    }

    pub fn push_change(&self, change: RawChange) {
        self.push(change.table, FeedMessage::Change(change));
    }

    pub fn subscribe_calls(&self) -> usize {
        self.inner.lock().unwrap().subscribe_calls
    }

    pub fn unsubscribed(&self) -> Vec<ChannelId> {
        self.inner.lock().unwrap().unsubscribed.clone()
    }
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    async fn subscribe(&self, table: Table) -> Result<FeedChannel, StoreError> {
        let (sender, messages) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock().unwrap();
            inner.subscribe_calls += 1;
            if let Some(err) = inner.fail_with.clone() {
                return Err(err);
            }
            inner.next_id += 1;
            let id = ChannelId(inner.next_id);
            inner.open.insert(id, (table, sender));
            id
        };
        self.subscribed.notify_waiters();
        Ok(FeedChannel {
            id,
            table,
            messages,
        })
    }

    async fn unsubscribe(&self, channel: ChannelId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.open.remove(&channel).is_some() {
            inner.unsubscribed.push(channel);
        }
    }
}

/// Auth port with a fixed answer for `current_user`.
pub struct StaticAuth {
    user: Option<AuthUser>,
    error: Option<StoreError>,
}

impl StaticAuth {
    pub fn signed_in() -> Self {
        Self {
            user: Some(AuthUser {
                id: "user-1".into(),
                email: "operator@mill.test".into(),
                created_at: Utc::now(),
            }),
            error: None,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            user: None,
            error: None,
        }
    }

    pub fn broken(err: StoreError) -> Self {
        Self {
            user: None,
            error: Some(err),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn sign_in(&self, _credentials: &Credentials) -> Result<AuthSession, StoreError> {
        Err(StoreError::authentication("sign-in disabled in tests"))
    }

    async fn sign_up(&self, _credentials: &Credentials) -> Result<AuthUser, StoreError> {
        Err(StoreError::authentication("sign-up disabled in tests"))
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, StoreError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.user.clone()),
        }
    }

    async fn refresh_session(&self) -> Result<AuthSession, StoreError> {
        Err(StoreError::authentication("refresh disabled in tests"))
    }
}

/// Reader that fails selects on `table`, either all of them or only the
/// filtered ones.
pub struct FailingReader {
    inner: Arc<dyn StoreReader>,
    table: Table,
    only_filtered: bool,
}

impl FailingReader {
    pub fn new(inner: Arc<dyn StoreReader>, table: Table, only_filtered: bool) -> Self {
        Self {
            inner,
            table,
            only_filtered,
        }
    }
}

#[async_trait]
impl StoreReader for FailingReader {
    async fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let fails = query.table == self.table && (!self.only_filtered || !query.filters.is_empty());
        if fails {
            return Err(StoreError::query(format!("{} is unavailable", self.table)));
        }
        self.inner.select(query).await
    }

    async fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError> {
        self.inner.count(table, filters).await
    }
}

/// Client over a fresh in-memory database with a scripted feed and a fixed
/// auth answer.
pub fn test_client(feed: Arc<ScriptedFeed>, signed_in: bool) -> StoreClient {
    let db = Arc::new(Database::in_memory().expect("in-memory database"));
    let auth = if signed_in {
        StaticAuth::signed_in()
    } else {
        StaticAuth::signed_out()
    };
    StoreClient::from_backend(db)
        .with_feed(feed)
        .with_auth(Arc::new(auth))
}

/// In-memory database with a signed-in operator, and a client over it.
pub async fn signed_in_backend() -> (Arc<Database>, StoreClient) {
    let db = Arc::new(Database::in_memory().expect("in-memory database"));
    let client = StoreClient::from_backend(db.clone());
    client
        .ensure_signed_in(&Credentials {
            email: "operator@mill.test".into(),
            password: "handloom".into(),
        })
        .await
        .expect("sign in");
    (db, client)
}
