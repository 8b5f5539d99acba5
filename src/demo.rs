//! Demo floor: seeds an empty store and keeps units moving through the
//! stations so the live views have something to show.

use std::time::Duration;

use chrono::Utc;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde_json::json;
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::{
    derived::{station_index, PRODUCTION_STATIONS},
    models::{Station, ThroughputCounter, Unit, UnitStatus},
    store::{Query, SortOrder, StoreClient, StoreError, Table},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Where units come from before their first station.
const ORIGIN_STATION: &str = "Loom";

const WEAVERS: [&str; 6] = [
    "Lakshmi Devi",
    "Ramesh Kumar",
    "Meena Bai",
    "Suresh Pal",
    "Anita Das",
    "Gopal Rao",
];
const COLORS: [&str; 6] = ["Maroon", "Mustard", "Teal", "Ivory", "Indigo", "Rani Pink"];
const DESIGNS: [&str; 4] = ["Butta", "Temple Border", "Checks", "Paisley"];
const LENGTHS: [&str; 3] = ["5.5m", "6.3m", "9 yards"];

fn progress_for(index: usize) -> u8 {
    let last = PRODUCTION_STATIONS.len() - 1;
    u8::try_from(index.min(last) * 100 / last).unwrap_or(100)
}

/// The simulator writes status alongside the station it moves a unit to.
/// Readers never derive one from the other.
fn status_for(index: usize) -> UnitStatus {
    if index + 1 >= PRODUCTION_STATIONS.len() {
        UnitStatus::Completed
    } else {
        UnitStatus::InProgress
    }
}

/// What one simulation step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub unit_code: String,
    pub from_station: String,
    pub to_station: String,
    pub completed: bool,
}

pub struct DemoSimulator {
    client: StoreClient,
    rng: StdRng,
}

impl DemoSimulator {
    pub fn new(client: StoreClient) -> Self {
        Self::with_rng(client, StdRng::from_entropy())
    }

    pub fn with_rng(client: StoreClient, rng: StdRng) -> Self {
        Self { client, rng }
    }

    /// Seed stations, `units` units with their movement history, and a
    /// throughput row. Does nothing when stations already exist.
    pub async fn seed_if_empty(&mut self, units: usize) -> Result<bool, StoreError> {
        if self.client.count(Table::Stations, &[]).await? > 0 {
            log_debug!("Store already has stations; skipping demo seed");
            return Ok(false);
        }

        let mut counts = [0i64; PRODUCTION_STATIONS.len()];
        let now = Utc::now();

        for n in 0..units {
            // Nobody starts the demo already finished.
            let index = self.rng.gen_range(0..PRODUCTION_STATIONS.len() - 1);
            let code = format!("SR-{}", 1001 + n);
            let hours_per_hop = self.rng.gen_range(2..30);
            let created_at = now - chrono::Duration::hours(hours_per_hop * (index as i64 + 1));

            let design = if self.rng.gen_bool(0.3) {
                None
            } else {
                DESIGNS.choose(&mut self.rng).copied()
            };

            self.client
                .insert(
                    Table::Units,
                    &json!({
                        "saree_id": code,
                        "article_number": format!("ART-{}", self.rng.gen_range(100..1000)),
                        "length": LENGTHS.choose(&mut self.rng).copied().unwrap_or("6.3m"),
                        "weaver_name": WEAVERS.choose(&mut self.rng).copied().unwrap_or("Unknown"),
                        "color": COLORS.choose(&mut self.rng).copied(),
                        "design": design,
                        "current_station": PRODUCTION_STATIONS[index],
                        "status": status_for(index).as_str(),
                        "progress": progress_for(index),
                        "created_at": created_at.to_rfc3339(),
                        "updated_at": created_at.to_rfc3339(),
                    }),
                )
                .await?;

            let mut from = ORIGIN_STATION;
            for (hop, &to) in PRODUCTION_STATIONS.iter().take(index + 1).enumerate() {
                let at = created_at + chrono::Duration::hours(hours_per_hop * hop as i64);
                self.client
                    .insert(
                        Table::Movements,
                        &json!({
                            "saree_id": code,
                            "from_station": from,
                            "to_station": to,
                            "timestamp": at.to_rfc3339(),
                            "created_at": at.to_rfc3339(),
                        }),
                    )
                    .await?;
                from = to;
            }
            counts[index] += 1;
        }

        for (name, count) in PRODUCTION_STATIONS.iter().zip(counts) {
            self.client
                .insert(Table::Stations, &json!({ "name": name, "count": count }))
                .await?;
        }
        self.client
            .insert(Table::Throughput, &json!({ "count": 0 }))
            .await?;

        log_info!("Seeded demo floor with {units} units");
        Ok(true)
    }

    async fn station_named(&self, name: &str) -> Result<Option<Station>, StoreError> {
        self.client
            .maybe_single(Query::table(Table::Stations).eq("name", name))
            .await
    }

    async fn adjust_station(&self, name: &str, delta: i64) -> Result<(), StoreError> {
        match self.station_named(name).await? {
            Some(station) => {
                let count = (station.live_count + delta).max(0);
                self.client
                    .update(Table::Stations, station.id, &json!({ "count": count }))
                    .await?;
            }
            None => log_warn!("Demo floor has no station named {name}"),
        }
        Ok(())
    }

    async fn bump_throughput(&self) -> Result<(), StoreError> {
        let latest: Option<ThroughputCounter> = self
            .client
            .maybe_single(Query::table(Table::Throughput).order_by("id", SortOrder::Descending))
            .await?;
        match latest {
            Some(row) => {
                self.client
                    .update(Table::Throughput, row.id, &json!({ "count": row.count + 1 }))
                    .await?;
            }
            None => {
                self.client
                    .insert(Table::Throughput, &json!({ "count": 1 }))
                    .await?;
            }
        }
        Ok(())
    }

    /// Move one random in-progress unit to its next station.
    pub async fn step(&mut self) -> Result<Option<Advance>, StoreError> {
        let in_progress: Vec<Unit> = self
            .client
            .select(&Query::table(Table::Units).eq("status", UnitStatus::InProgress.as_str()))
            .await?;

        let Some(unit) = in_progress.choose(&mut self.rng) else {
            return Ok(None);
        };
        let Some(index) = station_index(&unit.station) else {
            log_warn!("{} sits at unknown station {}", unit.code, unit.station);
            return Ok(None);
        };
        let next_index = (index + 1).min(PRODUCTION_STATIONS.len() - 1);
        let to = PRODUCTION_STATIONS[next_index];
        let completed = status_for(next_index) == UnitStatus::Completed;

        self.client
            .insert(
                Table::Movements,
                &json!({
                    "saree_id": unit.code,
                    "from_station": unit.station,
                    "to_station": to,
                }),
            )
            .await?;
        self.client
            .update(
                Table::Units,
                unit.id.clone(),
                &json!({
                    "current_station": to,
                    "status": status_for(next_index).as_str(),
                    "progress": progress_for(next_index),
                }),
            )
            .await?;
        self.adjust_station(&unit.station, -1).await?;
        self.adjust_station(to, 1).await?;
        if completed {
            self.bump_throughput().await?;
        }

        Ok(Some(Advance {
            unit_code: unit.code.clone(),
            from_station: unit.station.clone(),
            to_station: to.to_string(),
            completed,
        }))
    }

    /// Step every `period` until `shutdown` fires.
    pub fn spawn(mut self, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => match self.step().await {
                        Ok(Some(advance)) => log_info!(
                            "Demo: {} moved {} -> {}",
                            advance.unit_code,
                            advance.from_station,
                            advance.to_station
                        ),
                        Ok(None) => log_debug!("Demo: no unit left to move"),
                        Err(err) => log::error!("Demo step failed: {err}"),
                    },
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::Movement, test_support::signed_in_backend};

    #[tokio::test]
    async fn seeding_is_consistent_and_runs_once() {
        let (_db, client) = signed_in_backend().await;
        let mut demo = DemoSimulator::with_rng(client.clone(), StdRng::seed_from_u64(7));

        assert!(demo.seed_if_empty(10).await.unwrap());
        assert!(!demo.seed_if_empty(10).await.unwrap());

        let stations: Vec<Station> = client.select(&Query::table(Table::Stations)).await.unwrap();
        assert_eq!(stations.len(), PRODUCTION_STATIONS.len());
        assert_eq!(stations.iter().map(|s| s.live_count).sum::<i64>(), 10);

        let units: Vec<Unit> = client.select(&Query::table(Table::Units)).await.unwrap();
        assert_eq!(units.len(), 10);
        for unit in &units {
            let index = station_index(&unit.station).unwrap();
            let history: Vec<Movement> = client
                .select(&Query::table(Table::Movements).eq("saree_id", unit.code.as_str()))
                .await
                .unwrap();
            assert_eq!(history.len(), index + 1);
            assert_eq!(unit.progress_pct, progress_for(index));
        }
    }

    #[tokio::test]
    async fn step_advances_one_unit_and_keeps_counts() {
        let (_db, client) = signed_in_backend().await;
        let mut demo = DemoSimulator::with_rng(client.clone(), StdRng::seed_from_u64(11));
        demo.seed_if_empty(5).await.unwrap();
        let movements_before = client.count(Table::Movements, &[]).await.unwrap();

        let advance = demo.step().await.unwrap().expect("a unit moved");

        assert_eq!(
            station_index(&advance.to_station),
            station_index(&advance.from_station).map(|i| i + 1)
        );
        assert_eq!(
            client.count(Table::Movements, &[]).await.unwrap(),
            movements_before + 1
        );
        let moved: Unit = client
            .maybe_single(Query::table(Table::Units).eq("saree_id", advance.unit_code.as_str()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.station, advance.to_station);

        let stations: Vec<Station> = client.select(&Query::table(Table::Stations)).await.unwrap();
        assert_eq!(stations.iter().map(|s| s.live_count).sum::<i64>(), 5);
    }

    #[tokio::test]
    async fn completing_a_unit_bumps_throughput() {
        let (_db, client) = signed_in_backend().await;
        let mut demo = DemoSimulator::with_rng(client.clone(), StdRng::seed_from_u64(3));
        demo.seed_if_empty(1).await.unwrap();

        let mut completed = false;
        for _ in 0..PRODUCTION_STATIONS.len() {
            if let Some(advance) = demo.step().await.unwrap() {
                completed |= advance.completed;
            }
        }
        assert!(completed);

        let latest: ThroughputCounter = client
            .maybe_single(Query::table(Table::Throughput).order_by("id", SortOrder::Descending))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.count, 1);
        assert_eq!(demo.step().await.unwrap(), None);

        let finished: Vec<Unit> = client.select(&Query::table(Table::Units)).await.unwrap();
        assert_eq!(finished[0].status, UnitStatus::Completed);
        assert_eq!(finished[0].station, PRODUCTION_STATIONS[PRODUCTION_STATIONS.len() - 1]);
        assert_eq!(finished[0].progress_pct, 100);
    }
}
