use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::rows::find_by_id;
use crate::db::{
    helpers::{bind_value, column_ident, now_timestamp, quote_ident, read_value},
    Database,
};
use crate::store::{RawChange, Row, StoreError, StoreWriter, Table};

fn is_missing(row: &Row, column: &str) -> bool {
    row.get(column).map_or(true, Value::is_null)
}

/// Fill the values the store assigns when a writer leaves them out.
fn apply_insert_defaults(table: Table, row: &mut Row) {
    if is_missing(row, "id") {
        if table.uses_text_ids() {
            row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        } else {
            row.remove("id");
        }
    }

    let now = now_timestamp();
    for column in ["created_at", "updated_at", "timestamp"] {
        if table.has_column(column) && is_missing(row, column) {
            row.insert(column.into(), Value::String(now.clone()));
        }
    }
}

pub(crate) fn insert_row(conn: &Connection, table: Table, mut row: Row) -> Result<Row> {
    apply_insert_defaults(table, &mut row);

    let mut columns = Vec::with_capacity(row.len());
    let mut params = Vec::with_capacity(row.len());
    for (column, value) in &row {
        columns.push(column_ident(table, column)?);
        params.push(bind_value(column, value)?);
    }
    let placeholders = vec!["?"; columns.len()].join(", ");

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote_ident(table.as_str()),
        columns.join(", ")
    );
    conn.execute(&sql, params_from_iter(params))
        .with_context(|| format!("failed to insert into {table}"))?;

    let rowid = conn.last_insert_rowid();
    let stored = conn
        .query_row(
            &format!(
                "SELECT id FROM {} WHERE rowid = ?1",
                quote_ident(table.as_str())
            ),
            [rowid],
            |r| r.get_ref(0).map(read_value),
        )
        .with_context(|| format!("failed to read back inserted {table} row"))?;

    find_by_id(conn, table, &stored)?
        .ok_or_else(|| StoreError::query(format!("inserted {table} row vanished")).into())
}

/// Returns `(new, old)`, or `None` when the id does not exist.
pub(crate) fn update_row(
    conn: &Connection,
    table: Table,
    id: &Value,
    mut patch: Row,
) -> Result<Option<(Row, Row)>> {
    let Some(old) = find_by_id(conn, table, id)? else {
        return Ok(None);
    };

    patch.remove("id");
    if table.has_column("updated_at") && is_missing(&patch, "updated_at") {
        patch.insert("updated_at".into(), Value::String(now_timestamp()));
    }
    if patch.is_empty() {
        return Ok(Some((old.clone(), old)));
    }

    let mut assignments = Vec::with_capacity(patch.len());
    let mut params = Vec::with_capacity(patch.len() + 1);
    for (column, value) in &patch {
        assignments.push(format!("{} = ?", column_ident(table, column)?));
        params.push(bind_value(column, value)?);
    }
    params.push(bind_value("id", id)?);

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?",
        quote_ident(table.as_str()),
        assignments.join(", ")
    );
    conn.execute(&sql, params_from_iter(params))
        .with_context(|| format!("failed to update {table} row"))?;

    let new = find_by_id(conn, table, id)?
        .ok_or_else(|| StoreError::query(format!("updated {table} row vanished")))?;
    Ok(Some((new, old)))
}

pub(crate) fn delete_row(conn: &Connection, table: Table, id: &Value) -> Result<Option<Row>> {
    let Some(old) = find_by_id(conn, table, id)? else {
        return Ok(None);
    };

    conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", quote_ident(table.as_str())),
        [bind_value("id", id)?],
    )
    .with_context(|| format!("failed to delete {table} row"))?;

    Ok(Some(old))
}

fn announce(changes: &broadcast::Sender<RawChange>, change: RawChange) {
    // No receivers just means nobody is subscribed right now.
    let _ = changes.send(change);
}

#[async_trait]
impl StoreWriter for Database {
    async fn insert(&self, table: Table, row: Row) -> Result<Row, StoreError> {
        let changes = self.changes.clone();
        let stored = self
            .execute(move |conn| {
                let stored = insert_row(conn, table, row)?;
                announce(&changes, RawChange::insert(table, stored.clone()));
                Ok(stored)
            })
            .await?;
        Ok(stored)
    }

    async fn update(&self, table: Table, id: &Value, patch: Row) -> Result<Row, StoreError> {
        let changes = self.changes.clone();
        let id = id.clone();
        let updated = self
            .execute(move |conn| {
                let (new, old) = update_row(conn, table, &id, patch)?.ok_or_else(|| {
                    StoreError::query(format!("no {table} row with id {id}"))
                })?;
                announce(&changes, RawChange::update(table, new.clone(), old));
                Ok(new)
            })
            .await?;
        Ok(updated)
    }

    async fn delete(&self, table: Table, id: &Value) -> Result<Option<Row>, StoreError> {
        let changes = self.changes.clone();
        let id = id.clone();
        let deleted = self
            .execute(move |conn| {
                let deleted = delete_row(conn, table, &id)?;
                if let Some(old) = &deleted {
                    announce(&changes, RawChange::delete(table, old.clone()));
                }
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::{Filter, Query, SortOrder, StoreReader};
    use crate::test_support::as_row;

    #[tokio::test]
    async fn insert_assigns_ids_and_timestamps() {
        let db = Database::in_memory().unwrap();

        let movement = db
            .insert(
                Table::Movements,
                as_row(json!({ "saree_id": "S-1", "from_station": "Loom", "to_station": "Inspection" })),
            )
            .await
            .unwrap();
        assert!(movement["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(movement["timestamp"].as_str().is_some_and(|ts| ts.ends_with('Z')));
        assert_eq!(movement["created_at"], movement["timestamp"]);

        let first = db
            .insert(Table::Throughput, as_row(json!({ "count": 4 })))
            .await
            .unwrap();
        let second = db
            .insert(Table::Throughput, as_row(json!({ "count": 5 })))
            .await
            .unwrap();
        assert!(second["id"].as_i64() > first["id"].as_i64());
    }

    #[tokio::test]
    async fn unknown_columns_and_missing_rows_are_query_errors() {
        let db = Database::in_memory().unwrap();

        let bad_column = db
            .insert(Table::Stations, as_row(json!({ "name": "Dyeing", "colour": "red" })))
            .await
            .unwrap_err();
        assert!(matches!(bad_column, StoreError::Query { .. }));

        let missing = db
            .update(Table::Stations, &json!("nope"), as_row(json!({ "count": 1 })))
            .await
            .unwrap_err();
        assert!(missing.to_string().contains("no stations row with id"));

        assert_eq!(db.delete(Table::Stations, &json!("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_bumps_updated_at_and_keeps_id() {
        let db = Database::in_memory().unwrap();
        let created = db
            .insert(
                Table::Throughput,
                as_row(json!({ "count": 1, "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z" })),
            )
            .await
            .unwrap();

        let updated = db
            .update(
                Table::Throughput,
                &created["id"],
                as_row(json!({ "id": 999, "count": 2 })),
            )
            .await
            .unwrap();
        assert_eq!(updated["id"], created["id"]);
        assert_eq!(updated["count"], json!(2));
        assert_ne!(updated["updated_at"], created["updated_at"]);
        assert_eq!(updated["created_at"], json!("2024-01-01T00:00:00.000000Z"));
    }

    #[tokio::test]
    async fn select_filters_orders_limits_and_counts() {
        let db = Database::in_memory().unwrap();
        for (id, code, station, ts) in [
            ("m-1", "S-1", "Inspection", "2024-01-01T08:00:00Z"),
            ("m-2", "S-1", "Dyeing", "2024-01-02T08:00:00Z"),
            ("m-3", "S-2", "Dyeing", "2024-01-03T08:00:00+05:30"),
            ("m-4", "S-1", "Dyeing", "2024-01-04T08:00:00Z"),
        ] {
            db.insert(
                Table::Movements,
                as_row(json!({
                    "id": id,
                    "saree_id": code,
                    "from_station": "Loom",
                    "to_station": station,
                    "timestamp": ts,
                })),
            )
            .await
            .unwrap();
        }

        let latest = db
            .select(
                &Query::table(Table::Movements)
                    .eq("saree_id", "S-1")
                    .eq("to_station", "Dyeing")
                    .order_by("timestamp", SortOrder::Descending)
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0]["id"], json!("m-4"));

        let ascending = db
            .select(&Query::table(Table::Movements).order_by("timestamp", SortOrder::Ascending))
            .await
            .unwrap();
        let ids: Vec<_> = ascending.iter().map(|row| row["id"].clone()).collect();
        assert_eq!(ids, vec![json!("m-1"), json!("m-2"), json!("m-3"), json!("m-4")]);

        let into_dyeing = db
            .count(Table::Movements, &[Filter::eq("to_station", "Dyeing")])
            .await
            .unwrap();
        assert_eq!(into_dyeing, 3);
        assert_eq!(
            db.count(Table::Movements, &[Filter::eq("saree_id", "S-2")])
                .await
                .unwrap(),
            1
        );

        let bad_order = db
            .select(&Query::table(Table::Movements).order_by("when", SortOrder::Ascending))
            .await
            .unwrap_err();
        assert!(matches!(bad_order, StoreError::Query { .. }));
    }
}
