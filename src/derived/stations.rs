//! The fixed station sequences and the orderings derived from them.
//!
//! The production sequence and the timeline stages differ (the timeline has
//! no FMH stage). Both are used as-is by their views.

use serde::Serialize;

use crate::models::Station;

/// Station order on the dashboard and tracker progress bars.
pub const PRODUCTION_STATIONS: [&str; 6] =
    ["Inspection", "Dyeing", "FMH", "FWH", "FMG", "Showroom Inward"];

/// Stages shown on a unit's timeline.
pub const TIMELINE_STAGES: [&str; 5] = ["Inspection", "Dyeing", "FWH", "FMG", "Showroom Inward"];

/// Stations counted as work in progress.
pub const WIP_STATIONS: [&str; 4] = ["Inspection", "Dyeing", "FMH", "FWH"];

/// Position of `name` in the production sequence.
pub fn station_index(name: &str) -> Option<usize> {
    PRODUCTION_STATIONS.iter().position(|station| *station == name)
}

/// Stable sort into production order. Unknown names go first.
pub fn sort_stations(stations: &mut [Station]) {
    stations.sort_by_key(|station| station_index(&station.name));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentState {
    Complete,
    Active,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSegment {
    pub station: &'static str,
    pub state: SegmentState,
}

pub fn progress_segments(current_station: &str) -> Vec<ProgressSegment> {
    let current = station_index(current_station);
    PRODUCTION_STATIONS
        .iter()
        .enumerate()
        .map(|(index, station)| {
            let state = match current {
                Some(current) if index < current => SegmentState::Complete,
                Some(current) if index == current => SegmentState::Active,
                _ => SegmentState::Pending,
            };
            ProgressSegment { station, state }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WipStation {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WipBreakdown {
    pub stations: Vec<WipStation>,
    pub total: i64,
}

/// Live counts of the WIP stations present in `stations`, in WIP order.
pub fn wip_breakdown(stations: &[Station]) -> WipBreakdown {
    let stations: Vec<WipStation> = WIP_STATIONS
        .iter()
        .flat_map(|name| {
            stations
                .iter()
                .filter(move |station| station.name == *name)
                .map(|station| WipStation {
                    name: station.name.clone(),
                    count: station.live_count,
                })
        })
        .collect();
    let total = stations.iter().map(|station| station.count).sum();

    WipBreakdown { stations, total }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str, name: &str, count: i64) -> Station {
        Station {
            id: id.into(),
            name: name.into(),
            live_count: count,
        }
    }

    #[test]
    fn sort_is_canonical_stable_and_unknown_first() {
        let mut stations = vec![
            station("1", "Showroom Inward", 1),
            station("2", "Loom", 2),
            station("3", "Dyeing", 3),
            station("4", "Packing", 4),
            station("5", "Inspection", 5),
            station("6", "FMH", 6),
        ];
        sort_stations(&mut stations);

        let ids: Vec<_> = stations.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "4", "5", "3", "6", "1"]);
    }

    #[test]
    fn segments_split_around_current_station() {
        let states: Vec<_> = progress_segments("FWH").iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                SegmentState::Complete,
                SegmentState::Complete,
                SegmentState::Complete,
                SegmentState::Active,
                SegmentState::Pending,
                SegmentState::Pending,
            ]
        );
    }

    #[test]
    fn unknown_station_is_all_pending() {
        assert!(progress_segments("Warehouse")
            .iter()
            .all(|segment| segment.state == SegmentState::Pending));
    }

    #[test]
    fn wip_breakdown_keeps_wip_order_and_sums() {
        let stations = vec![
            station("1", "FWH", 4),
            station("2", "FMG", 100),
            station("3", "Inspection", 7),
            station("4", "Dyeing", 2),
        ];
        let wip = wip_breakdown(&stations);

        let names: Vec<_> = wip.stations.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Inspection", "Dyeing", "FWH"]);
        assert_eq!(wip.total, 13);
    }
}
