use serde::{Deserialize, Serialize};

use crate::{
    reconcile::Identified,
    store::{Record, Table},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Station {
    pub id: String,
    pub name: String,
    #[serde(rename = "count")]
    pub live_count: i64,
}

impl Identified for Station {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }
}

impl Record for Station {
    const TABLE: Table = Table::Stations;
}
