use chrono::{DateTime, Utc};

use crate::models::{Movement, Unit};

fn with_unit(value: i64, unit: &str) -> String {
    if value == 1 {
        format!("{value} {unit}")
    } else {
        format!("{value} {unit}s")
    }
}

/// Human label for the time elapsed since `reference`, bucketed into
/// minutes, hours or days. A reference in the future reads as zero minutes.
pub fn station_duration(now: DateTime<Utc>, reference: DateTime<Utc>) -> String {
    let elapsed = (now - reference).max(chrono::Duration::zero());
    let hours = elapsed.num_hours();

    if hours < 1 {
        with_unit(elapsed.num_minutes(), "minute")
    } else if hours < 24 {
        with_unit(hours, "hour")
    } else {
        with_unit(hours / 24, "day")
    }
}

/// Most recent movement that brought the unit to `station`.
pub fn latest_arrival<'a>(movements: &'a [Movement], station: &str) -> Option<&'a Movement> {
    movements
        .iter()
        .filter(|movement| movement.to_station == station)
        .max_by_key(|movement| movement.timestamp)
}

/// When the unit arrived at its current station, falling back to its
/// creation time when no arrival was recorded.
pub fn reference_timestamp(unit: &Unit, arrival: Option<&Movement>) -> DateTime<Utc> {
    arrival
        .filter(|movement| movement.to_station == unit.station)
        .map_or(unit.created_at, |movement| movement.timestamp)
}
