//! Presentation-only values recomputed from raw rows.

pub mod duration;
pub mod production;
pub mod search;
pub mod stations;
pub mod timeline;

pub use duration::{latest_arrival, reference_timestamp, station_duration};
pub use production::ProductionSummary;
pub use search::{MovementFilter, UnitFilter};
pub use stations::{
    progress_segments, sort_stations, station_index, wip_breakdown, ProgressSegment,
    SegmentState, WipBreakdown, WipStation, PRODUCTION_STATIONS, TIMELINE_STAGES, WIP_STATIONS,
};
pub use timeline::{build_timeline, StageState, TimelineStage};
