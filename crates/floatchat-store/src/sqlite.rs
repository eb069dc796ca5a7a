//! SQLite-backed store over the `argo_data` table written by the ingestion
//! pipeline.
//!
//! `rusqlite` is blocking, so every query hops onto the blocking pool. The
//! connection sits behind a mutex; queries are short and read-only.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, ToSql};

use crate::{calendar_date, DepthLevels, Record, RegionBounds, StoreError, StructuredStore};

const DATE_FMT: &str = "%Y-%m-%d";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS argo_data (
    id           INTEGER PRIMARY KEY,
    platform     TEXT,
    profile_time TEXT NOT NULL,
    lat          REAL NOT NULL,
    lon          REAL NOT NULL,
    temperature  REAL,
    salinity     REAL,
    levels       TEXT,
    extra        TEXT
);
CREATE INDEX IF NOT EXISTS argo_data_time ON argo_data(profile_time);
CREATE INDEX IF NOT EXISTS argo_data_latlon ON argo_data(lat, lon);
"#;

type SqlArg = Box<dyn ToSql + Send>;

fn arg<T: ToSql + Send + 'static>(value: T) -> SqlArg {
    Box::new(value)
}

const COLUMNS: &str =
    "id, platform, profile_time, lat, lon, temperature, salinity, levels, extra";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    label: String,
}

/// Column values as read, before JSON columns are decoded.
struct RawRow {
    id: i64,
    platform: Option<String>,
    profile_time: String,
    lat: f64,
    lon: f64,
    temperature: Option<f64>,
    salinity: Option<f64>,
    levels: Option<String>,
    extra: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            platform: row.get(1)?,
            profile_time: row.get(2)?,
            lat: row.get(3)?,
            lon: row.get(4)?,
            temperature: row.get(5)?,
            salinity: row.get(6)?,
            levels: row.get(7)?,
            extra: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<Record, StoreError> {
        // Timestamps written by other tools may carry a time component.
        let time = calendar_date(&self.profile_time).map_err(|e| {
            StoreError::InvalidData(format!(
                "record {}: bad profile_time `{}`: {e}",
                self.id, self.profile_time
            ))
        })?;
        let levels = match self.levels.as_deref() {
            Some(s) if !s.trim().is_empty() => Some(serde_json::from_str::<DepthLevels>(s)?),
            _ => None,
        };
        let extra = match self.extra.as_deref() {
            Some(s) if !s.trim().is_empty() => serde_json::from_str(s)?,
            _ => serde_json::Map::new(),
        };
        Ok(Record {
            id: self.id,
            platform: self.platform,
            time,
            lat: self.lat,
            lon: self.lon,
            temperature: self.temperature,
            salinity: self.salinity,
            levels,
            extra,
        })
    }
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the table exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            label: format!("sqlite({})", path.display()),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            label: "sqlite(:memory:)".to_string(),
        })
    }

    /// Insert or replace records in one transaction.
    pub fn insert_records(&self, records: &[Record]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO argo_data ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ))?;
            for r in records {
                let levels = r.levels.as_ref().map(serde_json::to_string).transpose()?;
                let extra = if r.extra.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&r.extra)?)
                };
                stmt.execute(params![
                    r.id,
                    r.platform,
                    r.time.format(DATE_FMT).to_string(),
                    r.lat,
                    r.lon,
                    r.temperature,
                    r.salinity,
                    levels,
                    extra,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    async fn select(
        &self,
        where_clause: &'static str,
        args: Vec<SqlArg>,
    ) -> Result<Vec<Record>, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<Vec<Record>, StoreError> {
            let conn = conn.lock();
            let sql = format!("SELECT {COLUMNS} FROM argo_data WHERE {where_clause} ORDER BY id");
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), RawRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(RawRow::into_record).collect()
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl StructuredStore for SqliteStore {
    async fn query_by_region(&self, b: RegionBounds) -> Result<Vec<Record>, StoreError> {
        self.select(
            "lat BETWEEN ?1 AND ?2 AND lon BETWEEN ?3 AND ?4",
            vec![
                arg(b.lat_min),
                arg(b.lat_max),
                arg(b.lon_min),
                arg(b.lon_max),
            ],
        )
        .await
    }

    async fn query_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Record>, StoreError> {
        // ISO dates compare correctly as text.
        self.select(
            "substr(profile_time, 1, 10) BETWEEN ?1 AND ?2",
            vec![
                arg(start.format(DATE_FMT).to_string()),
                arg(end.format(DATE_FMT).to_string()),
            ],
        )
        .await
    }

    async fn query_by_id(&self, id: i64) -> Result<Vec<Record>, StoreError> {
        self.select("id = ?1", vec![arg(id)]).await
    }

    async fn query_by_temperature_range(
        &self,
        min: f64,
        max: f64,
    ) -> Result<Vec<Record>, StoreError> {
        self.select(
            "(temperature BETWEEN ?1 AND ?2) OR EXISTS (\
                SELECT 1 FROM json_each(argo_data.levels, '$.temperature') AS t \
                WHERE t.value BETWEEN ?1 AND ?2)",
            vec![arg(min), arg(max)],
        )
        .await
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
