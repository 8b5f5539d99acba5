use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    reconcile::Identified,
    store::{Record, Table},
};

/// One hop of a unit between two stations (`transactions` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movement {
    pub id: String,
    #[serde(rename = "saree_id")]
    pub unit_code: String,
    pub from_station: String,
    pub to_station: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    pub fn touches_station(&self, station: &str) -> bool {
        self.from_station == station || self.to_station == station
    }
}

impl Identified for Movement {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }
}

impl Record for Movement {
    const TABLE: Table = Table::Movements;
}
