//! Ports onto the external store and the client that bundles them.
//!
//! The dashboard never talks to a backend directly: every read, write,
//! change subscription and session call goes through one of the traits in
//! this module, reached through an explicitly constructed [`StoreClient`]
//! that the application entry point owns and hands to each view.

pub mod auth;
pub mod error;
pub mod feed;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::reconcile::Identified;

pub use auth::{AuthProvider, AuthSession, AuthUser, Credentials};
pub use error::StoreError;
pub use feed::{ChangeFeed, ChannelId, ChannelStatus, FeedChannel, FeedMessage, RawChange};
pub use query::{Filter, Order, Query, Row, SortOrder, Table};

/// Request/response reads against the store.
#[async_trait]
pub trait StoreReader: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError>;

    async fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError>;
}

/// Writes proxied straight to the store. Each call returns the affected row
/// as stored, and the store announces the change on its feed.
#[async_trait]
pub trait StoreWriter: Send + Sync {
    async fn insert(&self, table: Table, row: Row) -> Result<Row, StoreError>;

    async fn update(&self, table: Table, id: &Value, patch: Row) -> Result<Row, StoreError>;

    /// Returns the deleted row, or `None` when no row had that id.
    async fn delete(&self, table: Table, id: &Value) -> Result<Option<Row>, StoreError>;
}

/// An entity stored in one of the dashboard tables.
pub trait Record: Identified + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;
}

/// Decode one raw row into an entity.
pub fn decode_row<T: DeserializeOwned>(row: Row) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(row)).map_err(StoreError::from)
}

fn encode_row<T: Serialize>(value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::decode(format!(
            "expected an object row, got {other}"
        ))),
    }
}

#[derive(Clone)]
pub struct StoreClient {
    reader: Arc<dyn StoreReader>,
    writer: Arc<dyn StoreWriter>,
    feed: Arc<dyn ChangeFeed>,
    auth: Arc<dyn AuthProvider>,
}

impl StoreClient {
    pub fn new(
        reader: Arc<dyn StoreReader>,
        writer: Arc<dyn StoreWriter>,
        feed: Arc<dyn ChangeFeed>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            reader,
            writer,
            feed,
            auth,
        }
    }

    /// Build a client whose ports are all served by one backend.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: StoreReader + StoreWriter + ChangeFeed + AuthProvider + 'static,
    {
        Self {
            reader: backend.clone(),
            writer: backend.clone(),
            feed: backend.clone(),
            auth: backend,
        }
    }

    pub fn with_feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.feed = feed;
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn StoreReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn feed(&self) -> &dyn ChangeFeed {
        self.feed.as_ref()
    }

    pub fn auth(&self) -> &dyn AuthProvider {
        self.auth.as_ref()
    }

    pub fn writer(&self) -> &dyn StoreWriter {
        self.writer.as_ref()
    }

    /// Select and decode rows of `T`'s table.
    pub async fn select<T: Record>(&self, query: &Query) -> Result<Vec<T>, StoreError> {
        if query.table != T::TABLE {
            return Err(StoreError::query(format!(
                "query targets {} but rows are decoded as {}",
                query.table,
                T::TABLE
            )));
        }
        self.reader
            .select(query)
            .await?
            .into_iter()
            .map(decode_row)
            .collect()
    }

    /// First row of the query, if any.
    pub async fn maybe_single<T: Record>(&self, query: Query) -> Result<Option<T>, StoreError> {
        let mut rows = self.select::<T>(&query.limit(1)).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    pub async fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError> {
        self.reader.count(table, filters).await
    }

    pub async fn insert<V: Serialize>(&self, table: Table, value: &V) -> Result<Row, StoreError> {
        self.writer.insert(table, encode_row(value)?).await
    }

    pub async fn update<V: Serialize>(
        &self,
        table: Table,
        id: impl Into<Value>,
        patch: &V,
    ) -> Result<Row, StoreError> {
        self.writer.update(table, &id.into(), encode_row(patch)?).await
    }

    pub async fn delete(
        &self,
        table: Table,
        id: impl Into<Value>,
    ) -> Result<Option<Row>, StoreError> {
        self.writer.delete(table, &id.into()).await
    }

    /// Sign in with `credentials`, registering the account first when the
    /// store does not know it yet.
    pub async fn ensure_signed_in(
        &self,
        credentials: &Credentials,
    ) -> Result<AuthSession, StoreError> {
        match self.auth.sign_in(credentials).await {
            Ok(session) => Ok(session),
            Err(StoreError::Authentication { message }) => {
                log::info!(
                    "Sign-in for {} failed ({message}); registering the account",
                    credentials.email
                );
                self.auth.sign_up(credentials).await?;
                self.auth.sign_in(credentials).await
            }
            Err(err) => Err(err),
        }
    }

    /// End the session owned by this client.
    pub async fn dispose(&self) -> Result<(), StoreError> {
        self.auth.sign_out().await
    }
}
