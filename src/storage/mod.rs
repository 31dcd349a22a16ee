//! Durable blob backend for persisted tables.
//!
//! Tables live as CSV objects under a fixed container, one object per dataset.
//! Writes are full-object overwrites; concurrent writers race last-writer-wins.
//!
//! Supported connection strings:
//! - Azure storage connection strings (`AccountName=...;AccountKey=...`) and
//!   `UseDevelopmentStorage=true` for the local emulator
//! - `file://<dir>` for a local directory, the container being a subdirectory
//! - `memory://` for an in-process store

mod table_store;

pub use table_store::{MergeSummary, TableStore};

use anyhow::{Context, Result};
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{TrackerError, TrackerResult};
use crate::table::Table;

/// Handling of a stored table that exists but cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadErrorPolicy {
    /// Fail the run and leave the stored object untouched.
    Abort,
    /// Log the failure and continue as if no table existed. The next write
    /// replaces the unreadable object.
    #[default]
    StartFresh,
}

/// Named CSV tables inside one container.
#[derive(Debug, Clone)]
pub struct BlobBackend {
    store: Arc<dyn ObjectStore>,
    container: String,
    /// Whether the container is part of the object path (non-Azure stores)
    container_in_path: bool,
}

impl BlobBackend {
    /// Build a backend from a connection string.
    pub fn from_connection_string(connection_string: &str, container: &str) -> Result<Self> {
        if let Some(dir) = connection_string.strip_prefix("file://") {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create storage directory {}", dir))?;
            let store = LocalFileSystem::new_with_prefix(dir)
                .with_context(|| format!("Failed to open local store at {}", dir))?;
            info!(dir, container, "Using local filesystem blob backend");
            return Ok(Self::with_store(Arc::new(store), container, true));
        }

        if connection_string.starts_with("memory://") {
            info!(container, "Using in-memory blob backend");
            return Ok(Self::in_memory(container));
        }

        let store = azure_store(connection_string, container)?;
        info!(container, "Using Azure blob backend");
        Ok(Self::with_store(Arc::new(store), container, false))
    }

    /// In-process backend, used for dry runs and tests.
    pub fn in_memory(container: &str) -> Self {
        Self::with_store(Arc::new(InMemory::new()), container, true)
    }

    fn with_store(store: Arc<dyn ObjectStore>, container: &str, container_in_path: bool) -> Self {
        Self {
            store,
            container: container.to_string(),
            container_in_path,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    fn object_path(&self, name: &str) -> Path {
        if self.container_in_path {
            Path::from(format!("{}/{}", self.container, name))
        } else {
            Path::from(name)
        }
    }

    /// Load a table; `Ok(None)` when the object does not exist.
    pub async fn load(&self, name: &str) -> TrackerResult<Option<Table>> {
        let path = self.object_path(name);
        let read_err = |message: String| TrackerError::StorageRead {
            object: name.to_string(),
            message,
        };

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                debug!(object = name, "No stored table");
                return Ok(None);
            }
            Err(e) => return Err(read_err(e.to_string())),
        };

        let bytes = result.bytes().await.map_err(|e| read_err(e.to_string()))?;
        let table = Table::from_csv(&bytes).map_err(|e| read_err(format!("{:#}", e)))?;

        debug!(object = name, rows = table.len(), "Loaded stored table");
        Ok(Some(table))
    }

    /// Overwrite the object with the full table.
    pub async fn store(&self, name: &str, table: &Table) -> TrackerResult<()> {
        let write_err = |message: String| TrackerError::StorageWrite {
            object: name.to_string(),
            message,
        };

        let body = table.to_csv().map_err(|e| write_err(format!("{:#}", e)))?;
        self.store
            .put(&self.object_path(name), PutPayload::from(body.into_bytes()))
            .await
            .map_err(|e| write_err(e.to_string()))?;

        debug!(object = name, rows = table.len(), "Stored table");
        Ok(())
    }

    /// Write raw bytes to an object, bypassing CSV encoding.
    #[cfg(test)]
    pub(crate) async fn put_raw(&self, name: &str, bytes: &'static [u8]) {
        self.store
            .put(&self.object_path(name), PutPayload::from_static(bytes))
            .await
            .unwrap();
    }
}

/// Parse `key=value;key=value` pairs of an Azure connection string.
fn parse_connection_string(connection_string: &str) -> HashMap<String, String> {
    connection_string
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn azure_store(connection_string: &str, container: &str) -> Result<impl ObjectStore> {
    let parts = parse_connection_string(connection_string);

    if parts
        .get("UseDevelopmentStorage")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return MicrosoftAzureBuilder::new()
            .with_use_emulator(true)
            .with_container_name(container)
            .build()
            .context("Failed to create Azure emulator store");
    }

    let account = parts
        .get("AccountName")
        .context("connection string has no AccountName")?;
    let key = parts
        .get("AccountKey")
        .context("connection string has no AccountKey")?;

    let mut builder = MicrosoftAzureBuilder::new()
        .with_account(account)
        .with_access_key(key)
        .with_container_name(container);

    if let Some(endpoint) = parts.get("BlobEndpoint") {
        builder = builder.with_endpoint(endpoint.clone());
    } else if let Some(suffix) = parts.get("EndpointSuffix") {
        let protocol = parts
            .get("DefaultEndpointsProtocol")
            .map(String::as_str)
            .unwrap_or("https");
        builder = builder.with_endpoint(format!("{}://{}.blob.{}", protocol, account, suffix));
    }

    builder.build().context("Failed to create Azure blob store")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{BalanceRow, BALANCE_COLUMNS};
    use rust_decimal_macros::dec;

    fn table() -> Table {
        Table::from_rows(&[BalanceRow {
            app_name: "Aave V3".to_string(),
            network: "ethereum".to_string(),
            updated_at: "2024-05-01T12:00:03.114Z".to_string(),
            token: "USDC".to_string(),
            balance: dec!(1000.5),
            usd_value: dec!(1000.47),
        }])
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let backend = BlobBackend::in_memory("defi-tracker");
        assert!(backend.load("defi-tracker.csv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let backend = BlobBackend::in_memory("defi-tracker");
        backend.store("defi-tracker.csv", &table()).await.unwrap();

        let loaded = backend.load("defi-tracker.csv").await.unwrap().unwrap();
        assert_eq!(loaded.columns(), BALANCE_COLUMNS);
        assert_eq!(loaded, table());
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let backend = BlobBackend::in_memory("defi-tracker");
        backend.store("defi-tracker.csv", &table()).await.unwrap();
        backend
            .store("defi-tracker.csv", &Table::with_columns(BALANCE_COLUMNS))
            .await
            .unwrap();

        let loaded = backend.load("defi-tracker.csv").await.unwrap().unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_object_is_read_error() {
        let backend = BlobBackend::in_memory("defi-tracker");
        backend
            .put_raw("defi-tracker.csv", b"App Name,Network\nAave\n")
            .await;

        let err = backend.load("defi-tracker.csv").await.unwrap_err();
        assert!(matches!(err, TrackerError::StorageRead { .. }));
    }

    #[tokio::test]
    async fn test_local_filesystem_backend() {
        let dir = std::env::temp_dir().join(format!("dyt-store-{}", std::process::id()));
        let conn = format!("file://{}", dir.display());
        let backend = BlobBackend::from_connection_string(&conn, "defi-tracker").unwrap();

        backend.store("APY-tracker.csv", &table()).await.unwrap();
        assert!(dir.join("defi-tracker").join("APY-tracker.csv").exists());
        assert_eq!(backend.load("APY-tracker.csv").await.unwrap().unwrap(), table());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_parse_connection_string() {
        let parts = parse_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=tracker;AccountKey=a2V5PT0=;EndpointSuffix=core.windows.net",
        );
        assert_eq!(parts["AccountName"], "tracker");
        // base64 padding survives the split on the first '='
        assert_eq!(parts["AccountKey"], "a2V5PT0=");
        assert_eq!(parts["EndpointSuffix"], "core.windows.net");
    }

    #[test]
    fn test_azure_connection_string_requires_account() {
        assert!(BlobBackend::from_connection_string("AccountKey=abc", "defi-tracker").is_err());
    }

    #[test]
    fn test_read_error_policy_deserialize() {
        let policy: ReadErrorPolicy = serde_json::from_str("\"start_fresh\"").unwrap();
        assert_eq!(policy, ReadErrorPolicy::StartFresh);
        let policy: ReadErrorPolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(policy, ReadErrorPolicy::Abort);
        assert_eq!(ReadErrorPolicy::default(), ReadErrorPolicy::StartFresh);
    }
}
