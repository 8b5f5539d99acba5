use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde_json::Value;

use crate::db::{
    helpers::{bind_value, column_ident, quote_ident, row_to_json, select_list, to_i64, to_u64},
    Database,
};
use crate::store::{Filter, Query, Row, SortOrder, StoreError, StoreReader, Table};

fn where_clause(table: Table, filters: &[Filter]) -> Result<(String, Vec<SqlValue>)> {
    if filters.is_empty() {
        return Ok((String::new(), Vec::new()));
    }

    let mut clauses = Vec::with_capacity(filters.len());
    let mut params = Vec::with_capacity(filters.len());
    for filter in filters {
        let column = column_ident(table, &filter.column)?;
        clauses.push(format!("{column} IS ?"));
        params.push(bind_value(&filter.column, &filter.value)?);
    }

    Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
}

pub(crate) fn select_rows(conn: &Connection, query: &Query) -> Result<Vec<Row>> {
    let table = query.table;
    let (where_sql, params) = where_clause(table, &query.filters)?;

    let mut sql = format!(
        "SELECT {} FROM {}{}",
        select_list(table),
        quote_ident(table.as_str()),
        where_sql
    );

    if let Some(order) = &query.order {
        let direction = match order.direction {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        // rowid breaks ties so equal timestamps keep insertion order.
        sql.push_str(&format!(
            " ORDER BY {} {direction}, rowid {direction}",
            column_ident(table, &order.column)?
        ));
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", to_i64(limit as u64)?));
    }

    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("failed to prepare select on {table}"))?;
    let rows = stmt
        .query_map(params_from_iter(params), |row| row_to_json(table, row))
        .with_context(|| format!("failed to select from {table}"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("failed to read {table} rows"))?;

    Ok(rows)
}

pub(crate) fn find_by_id(conn: &Connection, table: Table, id: &Value) -> Result<Option<Row>> {
    let query = Query::table(table).eq("id", id.clone()).limit(1);
    Ok(select_rows(conn, &query)?.into_iter().next())
}

pub(crate) fn count_rows(conn: &Connection, table: Table, filters: &[Filter]) -> Result<u64> {
    let (where_sql, params) = where_clause(table, filters)?;
    let sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        quote_ident(table.as_str()),
        where_sql
    );

    let count: i64 = conn
        .query_row(&sql, params_from_iter(params), |row| row.get(0))
        .with_context(|| format!("failed to count {table} rows"))?;

    to_u64(count, "row count")
}

#[async_trait]
impl StoreReader for Database {
    async fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let query = query.clone();
        let rows = self.execute(move |conn| select_rows(conn, &query)).await?;
        Ok(rows)
    }

    async fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError> {
        let filters = filters.to_vec();
        let count = self
            .execute(move |conn| count_rows(conn, table, &filters))
            .await?;
        Ok(count)
    }
}
