use chrono::{DateTime, Utc};
use serde::Serialize;

use super::stations::TIMELINE_STAGES;
use crate::models::{Movement, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Completed,
    Current,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineStage {
    pub name: &'static str,
    pub state: StageState,
    pub reached_at: Option<DateTime<Utc>>,
}

/// Lay the unit's movements over the timeline stages.
///
/// `movements` must be in ascending timestamp order; a stage is stamped with
/// the first movement into it.
pub fn build_timeline(unit: &Unit, movements: &[Movement]) -> Vec<TimelineStage> {
    let current_index = TIMELINE_STAGES
        .iter()
        .position(|stage| *stage == unit.station);

    TIMELINE_STAGES
        .iter()
        .enumerate()
        .map(|(index, &name)| {
            let is_current = name == unit.station;
            let arrival = movements.iter().find(|movement| movement.to_station == name);

            let (state, reached_at) = match arrival {
                Some(movement) if is_current => (StageState::Current, Some(movement.timestamp)),
                Some(movement) => (StageState::Completed, Some(movement.timestamp)),
                None if is_current => (StageState::Current, Some(unit.created_at)),
                None => match current_index {
                    Some(current) if index < current => {
                        (StageState::Completed, Some(unit.created_at))
                    }
                    _ => (StageState::Pending, None),
                },
            };

            TimelineStage {
                name,
                state,
                reached_at,
            }
        })
        .collect()
}
