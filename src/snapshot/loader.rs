use chrono::{DateTime, Utc};
use futures::future::try_join_all;

use super::{DashboardSnapshot, TrackedUnit, UnitDetail};
use crate::{
    derived::{
        build_timeline, latest_arrival, reference_timestamp, sort_stations, station_duration,
        wip_breakdown, ProductionSummary,
    },
    models::{Movement, Station, ThroughputCounter, Unit},
    store::{Query, SortOrder, StoreClient, StoreError, Table},
};

/// Reads whole view snapshots through the store client. Any failed read,
/// including one of the per-unit lookups, fails the whole load.
#[derive(Clone)]
pub struct SnapshotLoader {
    client: StoreClient,
}

impl SnapshotLoader {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// The most recent movement of `unit_code` into `station`.
    pub async fn latest_arrival(
        &self,
        unit_code: &str,
        station: &str,
    ) -> Result<Option<Movement>, StoreError> {
        self.client
            .maybe_single(
                Query::table(Table::Movements)
                    .eq("saree_id", unit_code)
                    .eq("to_station", station)
                    .order_by("timestamp", SortOrder::Descending),
            )
            .await
    }

    /// All units, newest first, each with its dwell duration.
    pub async fn tracker(&self, now: DateTime<Utc>) -> Result<Vec<TrackedUnit>, StoreError> {
        let units: Vec<Unit> = self
            .client
            .select(&Query::table(Table::Units).order_by("created_at", SortOrder::Descending))
            .await?;

        let arrivals = try_join_all(
            units
                .iter()
                .map(|unit| self.latest_arrival(&unit.code, &unit.station)),
        )
        .await?;

        Ok(units
            .into_iter()
            .zip(arrivals)
            .map(|(unit, arrival)| TrackedUnit::new(unit, arrival.as_ref(), now))
            .collect())
    }

    pub async fn movements(&self, order: SortOrder) -> Result<Vec<Movement>, StoreError> {
        self.client
            .select(&Query::table(Table::Movements).order_by("timestamp", order))
            .await
    }

    pub async fn dashboard(&self) -> Result<DashboardSnapshot, StoreError> {
        let mut stations: Vec<Station> = self.client.select(&Query::table(Table::Stations)).await?;
        sort_stations(&mut stations);

        let live_units = self.client.count(Table::Units, &[]).await?;
        let latest_throughput: Option<ThroughputCounter> = self
            .client
            .maybe_single(Query::table(Table::Throughput).order_by("id", SortOrder::Descending))
            .await?;

        let summary = ProductionSummary::compute(
            live_units,
            latest_throughput.as_ref().map(|row| row.count),
        );
        let wip = wip_breakdown(&stations);

        Ok(DashboardSnapshot {
            stations,
            live_units,
            latest_throughput,
            summary,
            wip,
        })
    }

    /// Detail of the unit with code `unit_code`, which must exist.
    pub async fn unit_detail(
        &self,
        unit_code: &str,
        now: DateTime<Utc>,
    ) -> Result<UnitDetail, StoreError> {
        let unit: Unit = self
            .client
            .maybe_single(Query::table(Table::Units).eq("saree_id", unit_code))
            .await?
            .ok_or_else(|| StoreError::query(format!("no unit with code {unit_code}")))?;

        let movements: Vec<Movement> = self
            .client
            .select(
                &Query::table(Table::Movements)
                    .eq("saree_id", unit_code)
                    .order_by("timestamp", SortOrder::Ascending),
            )
            .await?;

        let reference_at = reference_timestamp(&unit, latest_arrival(&movements, &unit.station));
        let timeline = build_timeline(&unit, &movements);

        Ok(UnitDetail {
            station_duration: station_duration(now, reference_at),
            reference_at,
            timeline,
            movements,
            unit,
        })
    }
}
