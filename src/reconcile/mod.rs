mod list;

pub use list::{apply, apply_in_place, Identified, ReconcileOutcome};
