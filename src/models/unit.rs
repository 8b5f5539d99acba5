//! Units (sarees) and their lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    reconcile::Identified,
    store::{Record, Table},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnitStatus {
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Inwarded,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::InProgress => "In Progress",
            UnitStatus::Completed => "Completed",
            UnitStatus::Inwarded => "Inwarded",
        }
    }
}

/// A saree as stored in the `sarees` table.
///
/// `status` and `station` are set independently by whoever writes the row;
/// nothing here derives one from the other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub id: String,
    #[serde(rename = "saree_id")]
    pub code: String,
    #[serde(rename = "article_number")]
    pub article_code: String,
    pub length: String,
    #[serde(rename = "weaver_name")]
    pub producer: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub design: Option<String>,
    #[serde(rename = "current_station")]
    pub station: String,
    pub status: UnitStatus,
    #[serde(rename = "progress")]
    pub progress_pct: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identified for Unit {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }
}

impl Record for Unit {
    const TABLE: Table = Table::Units;
}
