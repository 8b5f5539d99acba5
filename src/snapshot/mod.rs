//! One-shot reads that populate a view before live changes take over.

mod loader;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    derived::{
        progress_segments, reference_timestamp, station_duration, ProductionSummary,
        ProgressSegment, TimelineStage, WipBreakdown,
    },
    models::{Movement, Station, ThroughputCounter, Unit},
    reconcile::Identified,
};

pub use loader::SnapshotLoader;

/// A unit row on the tracker with its dwell time at the current station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedUnit {
    pub unit: Unit,
    pub reference_at: DateTime<Utc>,
    pub station_duration: String,
}

impl TrackedUnit {
    pub fn new(unit: Unit, arrival: Option<&Movement>, now: DateTime<Utc>) -> Self {
        let reference_at = reference_timestamp(&unit, arrival);
        Self {
            station_duration: station_duration(now, reference_at),
            unit,
            reference_at,
        }
    }

    /// Re-derive the duration label against a new clock reading.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        let label = station_duration(now, self.reference_at);
        if label == self.station_duration {
            return false;
        }
        self.station_duration = label;
        true
    }

    pub fn segments(&self) -> Vec<ProgressSegment> {
        progress_segments(&self.unit.station)
    }
}

impl Identified for TrackedUnit {
    type Id = String;

    fn id(&self) -> &String {
        &self.unit.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// In production order.
    pub stations: Vec<Station>,
    pub live_units: u64,
    pub latest_throughput: Option<ThroughputCounter>,
    pub summary: ProductionSummary,
    pub wip: WipBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitDetail {
    pub unit: Unit,
    /// Ascending by timestamp.
    pub movements: Vec<Movement>,
    pub reference_at: DateTime<Utc>,
    pub station_duration: String,
    pub timeline: Vec<TimelineStage>,
}
