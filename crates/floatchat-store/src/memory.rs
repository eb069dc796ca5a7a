//! In-memory store backed by a snapshot of records.
//!
//! Used for tests and for deployments that ship a JSON export instead of a
//! database file.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::{Record, RegionBounds, StoreError, StructuredStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<i64, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        store.extend(records);
        store
    }

    /// Load a JSON array or JSON Lines file of records.
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path)?;
        let records = parse_records(&text)?;
        tracing::info!(
            path = %path.display(),
            count = records.len(),
            "loaded record snapshot"
        );
        Ok(Self::from_records(records))
    }

    /// Insert or replace a record by id.
    pub fn insert(&self, record: Record) {
        self.records.write().insert(record.id, record);
    }

    pub fn extend(&self, records: impl IntoIterator<Item = Record>) {
        let mut guard = self.records.write();
        for r in records {
            guard.insert(r.id, r);
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn select(&self, pred: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.records
            .read()
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect()
    }
}

/// Parse either a JSON array of records or one record per line.
pub fn parse_records(text: &str) -> Result<Vec<Record>, StoreError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(line)
            .map_err(|e| StoreError::InvalidData(format!("line {}: {e}", lineno + 1)))?;
        out.push(record);
    }
    Ok(out)
}

#[async_trait]
impl StructuredStore for MemoryStore {
    async fn query_by_region(&self, bounds: RegionBounds) -> Result<Vec<Record>, StoreError> {
        Ok(self.select(|r| bounds.contains(r.lat, r.lon)))
    }

    async fn query_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.select(|r| start <= r.time && r.time <= end))
    }

    async fn query_by_id(&self, id: i64) -> Result<Vec<Record>, StoreError> {
        Ok(self.records.read().get(&id).cloned().into_iter().collect())
    }

    async fn query_by_temperature_range(
        &self,
        min: f64,
        max: f64,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.select(|r| r.any_temperature_in(min, max)))
    }

    fn describe(&self) -> String {
        format!("memory({} records)", self.len())
    }
}
