//! # DeFi Yield Tracker
//!
//! Scheduled collector that snapshots a wallet's DeFi app balances and the
//! APYs of lending/stablecoin opportunities into append-only CSV tables kept
//! in blob storage.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `provider`: Balance (REST) and yield (GraphQL) API clients
//! - `extract`: Flattening of provider responses into rows
//! - `table`: Row schemas and the CSV table codec
//! - `storage`: Blob backend and the append-and-persist table store
//! - `pipeline`: Generic fetch → extract → merge → store run per dataset
//! - `scheduler`: Cron trigger
//! - `utils`: Shared utilities and decimal helpers

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod provider;
pub mod scheduler;
pub mod storage;
pub mod table;
pub mod utils;

pub use config::Config;
pub use error::{TrackerError, TrackerResult};
