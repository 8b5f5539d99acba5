pub mod movement;
pub mod station;
pub mod throughput;
pub mod unit;

pub use movement::Movement;
pub use station::Station;
pub use throughput::ThroughputCounter;
pub use unit::{Unit, UnitStatus};
