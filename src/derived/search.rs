//! Free-text filters applied to the tracker and movement lists.

use crate::models::{Movement, Unit};

fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Matches a unit whose code contains the term, or whose article code or
/// producer contains it ignoring case. An empty term matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFilter {
    term: String,
    term_lower: String,
}

impl UnitFilter {
    pub fn new(term: impl Into<String>) -> Self {
        let term = term.into();
        let term_lower = term.to_lowercase();
        Self { term, term_lower }
    }

    pub fn matches(&self, unit: &Unit) -> bool {
        unit.code.contains(&self.term)
            || contains_ignore_case(&unit.article_code, &self.term_lower)
            || contains_ignore_case(&unit.producer, &self.term_lower)
    }
}

/// Matches movements by unit code (exact case) or either station (ignoring
/// case), optionally restricted to movements touching one station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementFilter {
    term: String,
    term_lower: String,
    station: Option<String>,
}

impl MovementFilter {
    pub fn new(term: impl Into<String>) -> Self {
        let term = term.into();
        let term_lower = term.to_lowercase();
        Self {
            term,
            term_lower,
            station: None,
        }
    }

    pub fn at_station(mut self, station: impl Into<String>) -> Self {
        self.station = Some(station.into());
        self
    }

    pub fn matches(&self, movement: &Movement) -> bool {
        let matches_term = movement.unit_code.contains(&self.term)
            || contains_ignore_case(&movement.from_station, &self.term_lower)
            || contains_ignore_case(&movement.to_station, &self.term_lower);
        let matches_station = self
            .station
            .as_deref()
            .map_or(true, |station| movement.touches_station(station));

        matches_term && matches_station
    }
}
