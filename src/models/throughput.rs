use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    reconcile::Identified,
    store::{Record, Table},
};

/// Completed-units counter for the current period. Only the row with the
/// highest id is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThroughputCounter {
    pub id: i64,
    pub count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identified for ThroughputCounter {
    type Id = i64;

    fn id(&self) -> &i64 {
        &self.id
    }
}

impl Record for ThroughputCounter {
    const TABLE: Table = Table::Throughput;
}
