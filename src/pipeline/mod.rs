//! The fetch → extract → merge → store pipeline shared by both datasets.
//!
//! A [`DatasetJob`] supplies the dataset-specific half (which provider, which
//! extractor); [`Pipeline`] runs it against the table store. A failed run
//! writes nothing, so the previously stored table stays authoritative.

mod jobs;

pub use jobs::{ApyJob, BalancesJob};

use async_trait::async_trait;
use std::fmt;
use std::time::Instant;
use tracing::{error, info, instrument};

use crate::error::TrackerResult;
use crate::storage::{MergeSummary, TableStore};
use crate::table::{TableRow, APY_COLUMNS, BALANCE_COLUMNS};

/// A tracked dataset, which is also the key of its persisted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Balances,
    Apy,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Balances, Dataset::Apy];

    /// Object name inside the storage container.
    pub fn object_name(&self) -> &'static str {
        match self {
            Dataset::Balances => "defi-tracker.csv",
            Dataset::Apy => "APY-tracker.csv",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Dataset::Balances => BALANCE_COLUMNS,
            Dataset::Apy => APY_COLUMNS,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Balances => write!(f, "balances"),
            Dataset::Apy => write!(f, "apy"),
        }
    }
}

/// The dataset-specific half of a run.
#[async_trait]
pub trait DatasetJob: Send + Sync {
    type Row: TableRow + Send + Sync;

    fn dataset(&self) -> Dataset;

    /// Fetch from the provider and flatten into rows.
    async fn collect(&self) -> TrackerResult<Vec<Self::Row>>;
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub dataset: Dataset,
    pub merge: MergeSummary,
}

/// Runs dataset jobs against one table store.
#[derive(Debug, Clone)]
pub struct Pipeline {
    store: TableStore,
}

impl Pipeline {
    pub fn new(store: TableStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    /// Run one job end to end.
    #[instrument(skip_all, fields(dataset = %job.dataset()))]
    pub async fn run<J: DatasetJob>(&self, job: &J) -> TrackerResult<RunReport> {
        let dataset = job.dataset();
        debug_assert_eq!(<J::Row as TableRow>::COLUMNS, dataset.columns());
        let started = Instant::now();

        let result = async {
            let rows = job.collect().await?;
            info!(%dataset, rows = rows.len(), "Rows extracted");
            self.store.merge_and_persist(dataset, &rows).await
        }
        .await;

        match result {
            Ok(merge) => {
                info!(
                    %dataset,
                    new = merge.new_rows,
                    total = merge.total_rows,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Run completed"
                );
                Ok(RunReport { dataset, merge })
            }
            Err(e) => {
                error!(%dataset, stage = %e.stage(), error = %e, "Run aborted, stored table left unchanged");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_keys() {
        assert_eq!(Dataset::Balances.object_name(), "defi-tracker.csv");
        assert_eq!(Dataset::Apy.object_name(), "APY-tracker.csv");
        assert_eq!(Dataset::Apy.to_string(), "apy");
        assert_eq!(Dataset::Balances.columns()[5], "USD value");
    }
}
