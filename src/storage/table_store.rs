//! Load, append and persist a dataset's table.

use tracing::{error, info, warn};

use super::{BlobBackend, ReadErrorPolicy};
use crate::error::{TrackerError, TrackerResult};
use crate::pipeline::Dataset;
use crate::table::{Table, TableRow};

/// Row counts of one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub existing_rows: usize,
    pub new_rows: usize,
    pub total_rows: usize,
}

/// Append-only table store on top of the blob backend.
#[derive(Debug, Clone)]
pub struct TableStore {
    backend: BlobBackend,
    on_read_error: ReadErrorPolicy,
}

impl TableStore {
    pub fn new(backend: BlobBackend, on_read_error: ReadErrorPolicy) -> Self {
        Self {
            backend,
            on_read_error,
        }
    }

    pub fn backend(&self) -> &BlobBackend {
        &self.backend
    }

    /// The stored table of `dataset`, or an empty one when nothing is stored.
    ///
    /// Unreadable objects follow the configured [`ReadErrorPolicy`].
    pub async fn load_existing(&self, dataset: Dataset) -> TrackerResult<Table> {
        match self.backend.load(dataset.object_name()).await {
            Ok(Some(table)) => Ok(table),
            Ok(None) => {
                info!(%dataset, "No existing table, starting a new one");
                Ok(Table::default())
            }
            Err(e) => match self.on_read_error {
                ReadErrorPolicy::Abort => {
                    error!(%dataset, stage = %e.stage(), error = %e, "Stored table unreadable");
                    Err(e)
                }
                ReadErrorPolicy::StartFresh => {
                    warn!(
                        %dataset,
                        stage = %e.stage(),
                        error = %e,
                        "Stored table unreadable, it will be replaced by this run's rows"
                    );
                    Ok(Table::default())
                }
            },
        }
    }

    /// Append `rows` after the stored rows of `dataset` and overwrite the object.
    pub async fn merge_and_persist<R: TableRow>(
        &self,
        dataset: Dataset,
        rows: &[R],
    ) -> TrackerResult<MergeSummary> {
        let mut table = self.load_existing(dataset).await?;
        let existing_rows = table.len();

        table.append(Table::from_rows(rows))?;

        self.backend.store(dataset.object_name(), &table).await?;

        let summary = MergeSummary {
            existing_rows,
            new_rows: rows.len(),
            total_rows: table.len(),
        };
        info!(
            %dataset,
            container = self.backend.container(),
            existing = summary.existing_rows,
            new = summary.new_rows,
            total = summary.total_rows,
            "Table persisted"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{ApyRow, BalanceRow, APY_COLUMNS};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn apy(protocol: &str, apy: Decimal) -> ApyRow {
        ApyRow {
            defi_protocol: protocol.to_string(),
            network: "Ethereum".to_string(),
            updated_at: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            token: "USDC".to_string(),
            apy,
        }
    }

    fn store(policy: ReadErrorPolicy) -> TableStore {
        TableStore::new(BlobBackend::in_memory("defi-tracker"), policy)
    }

    fn protocols(table: &Table) -> Vec<String> {
        table.records().iter().map(|r| r[0].clone()).collect()
    }

    #[tokio::test]
    async fn test_bootstrap_writes_only_new_rows() {
        let store = store(ReadErrorPolicy::Abort);
        let summary = store
            .merge_and_persist(Dataset::Apy, &[apy("r1", dec!(5.32))])
            .await
            .unwrap();
        assert_eq!(summary, MergeSummary { existing_rows: 0, new_rows: 1, total_rows: 1 });

        let stored = store.backend().load("APY-tracker.csv").await.unwrap().unwrap();
        assert_eq!(stored.columns(), APY_COLUMNS);
        assert_eq!(protocols(&stored), vec!["r1"]);
    }

    #[tokio::test]
    async fn test_merge_appends_in_order() {
        let store = store(ReadErrorPolicy::Abort);
        store
            .merge_and_persist(Dataset::Apy, &[apy("r1", dec!(1)), apy("r2", dec!(2))])
            .await
            .unwrap();
        let summary = store
            .merge_and_persist(Dataset::Apy, &[apy("r3", dec!(3)), apy("r4", dec!(4))])
            .await
            .unwrap();
        assert_eq!(summary.total_rows, 4);

        let stored = store.load_existing(Dataset::Apy).await.unwrap();
        assert_eq!(protocols(&stored), vec!["r1", "r2", "r3", "r4"]);
    }

    #[tokio::test]
    async fn test_schema_mismatch_leaves_table_untouched() {
        let store = store(ReadErrorPolicy::Abort);
        store
            .backend()
            .put_raw("defi-tracker.csv", b"Defi Protocol,Network,Updated At,Token,APY\naave,Ethereum,2024-05-01,USDC,5.32\n")
            .await;

        let row = BalanceRow {
            app_name: "Aave V3".to_string(),
            network: "ethereum".to_string(),
            updated_at: "2024-05-02T12:00:00Z".to_string(),
            token: "USDC".to_string(),
            balance: dec!(1),
            usd_value: dec!(1),
        };
        let err = store
            .merge_and_persist(Dataset::Balances, &[row])
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::SchemaMismatch { .. }));

        let stored = store.load_existing(Dataset::Balances).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.records()[0][0], "aave");
    }

    #[tokio::test]
    async fn test_unreadable_table_abort_policy() {
        let store = store(ReadErrorPolicy::Abort);
        store.backend().put_raw("APY-tracker.csv", b"Defi Protocol,APY\na,1,extra\n").await;

        let err = store
            .merge_and_persist(Dataset::Apy, &[apy("r1", dec!(1))])
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::StorageRead { .. }));

        // object not replaced
        assert!(store.backend().load("APY-tracker.csv").await.is_err());
    }

    #[tokio::test]
    async fn test_unreadable_table_start_fresh() {
        let store = store(ReadErrorPolicy::StartFresh);
        store.backend().put_raw("APY-tracker.csv", b"Defi Protocol,APY\na,1,extra\n").await;

        let summary = store
            .merge_and_persist(Dataset::Apy, &[apy("r1", dec!(1))])
            .await
            .unwrap();
        assert_eq!(summary.existing_rows, 0);
        assert_eq!(summary.total_rows, 1);
    }

    #[tokio::test]
    async fn test_unreadable_table_starts_fresh_by_default() {
        let store = store(ReadErrorPolicy::default());
        store.backend().put_raw("APY-tracker.csv", b"Defi Protocol,APY\na,1,extra\n").await;

        let summary = store
            .merge_and_persist(Dataset::Apy, &[apy("r1", dec!(1))])
            .await
            .unwrap();
        assert_eq!(summary.existing_rows, 0);
        assert_eq!(summary.total_rows, 1);

        let stored = store.load_existing(Dataset::Apy).await.unwrap();
        assert_eq!(stored.columns(), APY_COLUMNS);
        assert_eq!(protocols(&stored), vec!["r1"]);
    }
}
