//! FloatChat Structured Store
//!
//! Typed, read-only access to persisted Argo float profiles:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    STRUCTURED STORE                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  query_by_region ──────┐                                      │
//! │  query_by_date_range ──┤      ┌──────────────┐                │
//! │  query_by_id ──────────┼─────►│ StructuredStore│──► Vec<Record>│
//! │  query_by_temperature ─┘      └──────┬───────┘                │
//! │                                      │                        │
//! │                        ┌─────────────┴─────────────┐          │
//! │                        ▼                           ▼          │
//! │                 ┌─────────────┐            ┌─────────────┐    │
//! │                 │ MemoryStore │            │ SqliteStore │    │
//! │                 │ (snapshots) │            │ (argo_data) │    │
//! │                 └─────────────┘            └─────────────┘    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are immutable snapshots. Every query returns owned copies ordered
//! by ascending `id`; callers narrow result sets by replacing the vector, never
//! by editing records in place.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

// ============================================================================
// Core Types
// ============================================================================

/// A running result set. Stages rebind it; they never mutate records.
pub type ResultSet = Vec<Record>;

/// One Argo profile as persisted by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key.
    pub id: i64,
    /// Float platform number, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Profile date, serialized as `YYYY-MM-DD`. Timestamps keep their date.
    #[serde(alias = "profile_time", deserialize_with = "de_calendar_date")]
    pub time: NaiveDate,
    pub lat: f64,
    pub lon: f64,
    /// Representative (surface) temperature in °C.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Representative (surface) practical salinity.
    #[serde(default)]
    pub salinity: Option<f64>,
    /// Depth-indexed measurements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<DepthLevels>,
    /// Any further columns, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Depth-indexed arrays for a single profile. Arrays are aligned by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthLevels {
    #[serde(default)]
    pub pressure: Vec<f64>,
    #[serde(default)]
    pub temperature: Vec<f64>,
    #[serde(default)]
    pub salinity: Vec<f64>,
}

impl Record {
    /// Minimal record with no optional measurements.
    pub fn new(id: i64, time: NaiveDate, lat: f64, lon: f64) -> Self {
        Self {
            id,
            platform: None,
            time,
            lat,
            lon,
            temperature: None,
            salinity: None,
            levels: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_salinity(mut self, salinity: f64) -> Self {
        self.salinity = Some(salinity);
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_levels(mut self, levels: DepthLevels) -> Self {
        self.levels = Some(levels);
        self
    }

    /// Store-side temperature match: the scalar temperature or any depth
    /// level lies in `[min, max]`.
    pub fn any_temperature_in(&self, min: f64, max: f64) -> bool {
        let in_range = |t: f64| min <= t && t <= max;
        self.temperature.is_some_and(in_range)
            || self
                .levels
                .as_ref()
                .is_some_and(|l| l.temperature.iter().copied().any(in_range))
    }

    /// Canonical textual form: the full field mapping as compact JSON.
    pub fn canonical_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"id\":{}}}", self.id))
    }
}

/// Calendar date of `YYYY-MM-DD` with an optional trailing time component.
pub fn calendar_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    let s = s.trim();
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
}

fn de_calendar_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    calendar_date(&raw)
        .map_err(|e| serde::de::Error::custom(format!("bad profile_time `{raw}`: {e}")))
}

/// Inclusive geographic bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl RegionBounds {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.lat_min <= lat && lat <= self.lat_max && self.lon_min <= lon && lon <= self.lon_max
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid record data: {0}")]
    InvalidData(String),
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

// ============================================================================
// Adapter Trait
// ============================================================================

/// Read-only accessors over persisted records. All ranges are inclusive.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    async fn query_by_region(&self, bounds: RegionBounds) -> Result<Vec<Record>, StoreError>;

    async fn query_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Record>, StoreError>;

    /// Zero or one record.
    async fn query_by_id(&self, id: i64) -> Result<Vec<Record>, StoreError>;

    async fn query_by_temperature_range(
        &self,
        min: f64,
        max: f64,
    ) -> Result<Vec<Record>, StoreError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_record_serializes_time_as_plain_date() {
        let r = Record::new(7, date("2022-08-15"), 10.5, 70.25).with_temperature(28.1);
        let v: serde_json::Value = serde_json::from_str(&r.canonical_text()).unwrap();
        assert_eq!(v["time"], "2022-08-15");
        assert_eq!(v["id"], 7);
        assert_eq!(v["temperature"], 28.1);
    }

    #[test]
    fn test_record_accepts_profile_time_and_keeps_extra_fields() {
        let raw = r#"{"id":3,"profile_time":"2022-01-02","lat":1.0,"lon":2.0,
                      "temperature":null,"region":"Indian Ocean"}"#;
        let r: Record = serde_json::from_str(raw).unwrap();
        assert_eq!(r.time, date("2022-01-02"));
        assert_eq!(r.temperature, None);
        assert_eq!(r.extra["region"], "Indian Ocean");
    }

    #[test]
    fn test_any_temperature_checks_levels() {
        let r = Record::new(1, date("2022-01-01"), 0.0, 0.0)
            .with_temperature(29.0)
            .with_levels(DepthLevels {
                pressure: vec![0.0, 500.0],
                temperature: vec![29.0, 4.5],
                salinity: vec![35.0, 34.6],
            });
        assert!(r.any_temperature_in(0.0, 5.0));
        assert!(r.any_temperature_in(28.0, 30.0));
        assert!(!r.any_temperature_in(10.0, 20.0));
    }

    #[test]
    fn test_region_bounds_are_inclusive() {
        let b = RegionBounds {
            lat_min: -10.0,
            lat_max: 10.0,
            lon_min: 60.0,
            lon_max: 80.0,
        };
        assert!(b.contains(10.0, 60.0));
        assert!(!b.contains(10.01, 70.0));
    }
}
