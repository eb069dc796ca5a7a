//! Plan execution.
//!
//! ```text
//!   Plan[0] ──seed──► StructuredStore ──► rows
//!   Plan[1] ──filter─► rows ──► rows'
//!   ...                    (empty after any step ⇒ NoData, stop)
//! ```

use std::sync::Arc;
use std::time::Duration;

use floatchat_store::{ResultSet, StoreError, StructuredStore};

use crate::error::{bounded, QueryError, Stage};
use crate::filters;
use crate::plan::{Operation, Plan};

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// Non-empty survivors of every step.
    Rows(ResultSet),
    /// `halted_at` is the step that produced the empty set; `None` when the
    /// plan had nothing to run.
    NoData { halted_at: Option<usize> },
}

impl Execution {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Execution::NoData { .. })
    }
}

impl Operation {
    /// Store query form, used at position 0.
    pub async fn seed(&self, store: &dyn StructuredStore) -> Result<ResultSet, StoreError> {
        match *self {
            Operation::ByTemperatureRange { temp_min, temp_max } => {
                store.query_by_temperature_range(temp_min, temp_max).await
            }
            Operation::ByRegion(bounds) => store.query_by_region(bounds).await,
            Operation::ByDateRange {
                start_date,
                end_date,
            } => store.query_by_date_range(start_date, end_date).await,
            Operation::ById { profile_id } => store.query_by_id(profile_id).await,
        }
    }

    /// In-memory form, used at every later position.
    pub fn refine(&self, results: ResultSet) -> ResultSet {
        match *self {
            Operation::ByTemperatureRange { temp_min, temp_max } => {
                filters::filter_by_temperature_range(results, temp_min, temp_max)
            }
            Operation::ByRegion(bounds) => filters::filter_by_region(results, bounds),
            Operation::ByDateRange {
                start_date,
                end_date,
            } => filters::filter_by_date_range(results, start_date, end_date),
            Operation::ById { profile_id } => filters::filter_by_id(results, profile_id),
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn StructuredStore>,
    timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn StructuredStore>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Bound the seed query.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the plan step by step, stopping at the first empty set.
    pub async fn execute(&self, plan: &Plan) -> Result<Execution, QueryError> {
        let mut steps = plan.iter().enumerate();
        let Some((_, first)) = steps.next() else {
            tracing::debug!("empty plan, nothing to execute");
            return Ok(Execution::NoData { halted_at: None });
        };

        let mut rows = bounded(Stage::Store, self.timeout, first.seed(self.store.as_ref())).await?;
        tracing::debug!(step = 0, op = %first.kind(), rows = rows.len(), "seed query");
        if rows.is_empty() {
            return Ok(Execution::NoData { halted_at: Some(0) });
        }

        for (step, op) in steps {
            rows = op.refine(rows);
            tracing::debug!(step, op = %op.kind(), rows = rows.len(), "filter");
            if rows.is_empty() {
                return Ok(Execution::NoData {
                    halted_at: Some(step),
                });
            }
        }
        Ok(Execution::Rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use floatchat_store::{MemoryStore, Record, RegionBounds};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 8, d).unwrap()
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::from_records([
            Record::new(1, day(2), 10.0, 70.0).with_temperature(29.0),
            Record::new(2, day(15), 12.0, 72.0).with_temperature(18.0),
            Record::new(3, day(28), -30.0, 20.0).with_temperature(4.0),
        ]))
    }

    #[tokio::test]
    async fn test_seed_then_filters() {
        let pipeline = Pipeline::new(store());
        let plan = Plan::new(vec![
            Operation::ByDateRange {
                start_date: day(1),
                end_date: day(20),
            },
            Operation::ByTemperatureRange {
                temp_min: 25.0,
                temp_max: 40.0,
            },
        ]);
        let Execution::Rows(rows) = pipeline.execute(&plan).await.unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_empty_plan_is_no_data() {
        let pipeline = Pipeline::new(store());
        assert_eq!(
            pipeline.execute(&Plan::default()).await.unwrap(),
            Execution::NoData { halted_at: None }
        );
    }

    #[tokio::test]
    async fn test_region_seed_excluding_everything_halts_at_zero() {
        let pipeline = Pipeline::new(store());
        let plan = Plan::new(vec![
            Operation::ByRegion(RegionBounds {
                lat_min: 60.0,
                lat_max: 70.0,
                lon_min: 0.0,
                lon_max: 5.0,
            }),
            Operation::ById { profile_id: 1 },
        ]);
        assert_eq!(
            pipeline.execute(&plan).await.unwrap(),
            Execution::NoData { halted_at: Some(0) }
        );
    }

    #[tokio::test]
    async fn test_halts_at_filter_step() {
        let pipeline = Pipeline::new(store());
        let plan = Plan::new(vec![
            Operation::ById { profile_id: 2 },
            Operation::ByTemperatureRange {
                temp_min: 25.0,
                temp_max: 30.0,
            },
            Operation::ById { profile_id: 2 },
        ]);
        assert_eq!(
            pipeline.execute(&plan).await.unwrap(),
            Execution::NoData { halted_at: Some(1) }
        );
    }

    #[tokio::test]
    async fn test_later_region_step_passes_through() {
        let pipeline = Pipeline::new(store());
        let plan = Plan::new(vec![
            Operation::ByTemperatureRange {
                temp_min: -5.0,
                temp_max: 40.0,
            },
            Operation::ByRegion(RegionBounds {
                lat_min: 60.0,
                lat_max: 70.0,
                lon_min: 0.0,
                lon_max: 5.0,
            }),
        ]);
        let Execution::Rows(rows) = pipeline.execute(&plan).await.unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 3);
    }
}
