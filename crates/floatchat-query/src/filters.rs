//! In-memory refinements applied after the seed query.
//!
//! Every filter consumes the running set and returns a new one. Bounds are
//! inclusive. Records without a scalar temperature never pass a temperature
//! filter.

use chrono::NaiveDate;
use floatchat_store::{RegionBounds, ResultSet};

pub fn filter_by_temperature_range(results: ResultSet, min: f64, max: f64) -> ResultSet {
    results
        .into_iter()
        .filter(|r| r.temperature.is_some_and(|t| min <= t && t <= max))
        .collect()
}

pub fn filter_by_date_range(results: ResultSet, start: NaiveDate, end: NaiveDate) -> ResultSet {
    results
        .into_iter()
        .filter(|r| start <= r.time && r.time <= end)
        .collect()
}

pub fn filter_by_id(results: ResultSet, id: i64) -> ResultSet {
    results.into_iter().filter(|r| r.id == id).collect()
}

/// Region bounds are only enforced by the store; a later region step keeps
/// the set as it is.
pub fn filter_by_region(results: ResultSet, bounds: RegionBounds) -> ResultSet {
    tracing::warn!(
        ?bounds,
        "byRegion after the first step does not narrow results"
    );
    results
}
