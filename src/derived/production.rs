use serde::Serialize;

/// Offset added to the live unit count for the "in production" figure.
pub const IN_PRODUCTION_BASELINE: u64 = 900;
/// Offset added to the latest throughput counter.
pub const DAILY_COMPLETED_BASELINE: i64 = 300;
pub const MIN_DAILY_TARGET: u64 = 120;
/// Share of live units expected to complete per day, in percent.
pub const DAILY_TARGET_PERCENT: u64 = 10;

/// Headline production figures for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionSummary {
    pub total_in_production: u64,
    pub daily_completed: i64,
    pub daily_target: u64,
    pub completion_percent: i64,
}

impl ProductionSummary {
    /// `latest_throughput` is the count of the newest throughput row, if any.
    pub fn compute(live_units: u64, latest_throughput: Option<i64>) -> Self {
        let daily_completed = DAILY_COMPLETED_BASELINE + latest_throughput.unwrap_or(0);
        let share = (live_units * DAILY_TARGET_PERCENT).div_ceil(100);
        let daily_target = share.max(MIN_DAILY_TARGET);
        let completion_percent =
            (daily_completed as f64 / daily_target as f64 * 100.0).round() as i64;

        Self {
            total_in_production: IN_PRODUCTION_BASELINE + live_units,
            daily_completed,
            daily_target,
            completion_percent,
        }
    }
}
