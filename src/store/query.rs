use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw row as delivered by the store: column name to JSON value.
pub type Row = Map<String, Value>;

/// The entity tables the dashboard reads and subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    #[serde(rename = "sarees")]
    Units,
    #[serde(rename = "transactions")]
    Movements,
    #[serde(rename = "stations")]
    Stations,
    #[serde(rename = "through_put")]
    Throughput,
}

impl Table {
    /// Name of the table in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Units => "sarees",
            Table::Movements => "transactions",
            Table::Stations => "stations",
            Table::Throughput => "through_put",
        }
    }

    /// Columns exposed by the table. Queries naming anything else are rejected.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Units => &[
                "id",
                "saree_id",
                "article_number",
                "length",
                "weaver_name",
                "color",
                "design",
                "current_station",
                "status",
                "progress",
                "created_at",
                "updated_at",
            ],
            Table::Movements => &[
                "id",
                "saree_id",
                "from_station",
                "to_station",
                "timestamp",
                "created_at",
            ],
            Table::Stations => &["id", "name", "count"],
            Table::Throughput => &["id", "count", "created_at", "updated_at"],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Whether row ids are text ids assigned on insert rather than a
    /// store-side sequence.
    pub fn uses_text_ids(&self) -> bool {
        !matches!(self, Table::Throughput)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub direction: SortOrder,
}

/// A select against one table: equality filters, an optional order and an
/// optional row limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortOrder) -> Self {
        self.order = Some(Order {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_table_names_match_store_names() {
        for table in [
            Table::Units,
            Table::Movements,
            Table::Stations,
            Table::Throughput,
        ] {
            assert_eq!(serde_json::to_value(table).unwrap(), Value::from(table.as_str()));
        }
        let parsed: Table = serde_json::from_str("\"through_put\"").unwrap();
        assert_eq!(parsed, Table::Throughput);
    }

    #[test]
    fn builder_collects_filters_order_and_limit() {
        let query = Query::table(Table::Movements)
            .eq("saree_id", "S-1001")
            .eq("to_station", "Dyeing")
            .order_by("timestamp", SortOrder::Descending)
            .limit(1);

        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[1].value, Value::from("Dyeing"));
        assert_eq!(query.order.as_ref().map(|o| o.column.as_str()), Some("timestamp"));
        assert_eq!(query.limit, Some(1));
    }
}
