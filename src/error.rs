//! Error taxonomy for a collection run.
//!
//! Every variant aborts the run that produced it, except `StorageRead` which the
//! table store downgrades to an empty table unless the `abort` policy is set.

use std::fmt;
use thiserror::Error;

/// Pipeline stage an error originated from, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Extract,
    Load,
    Merge,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Extract => write!(f, "extract"),
            Stage::Load => write!(f, "load"),
            Stage::Merge => write!(f, "merge"),
            Stage::Store => write!(f, "store"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Transport failure, timeout or non-2xx status from a provider.
    #[error("upstream request failed ({provider}): {message}")]
    UpstreamRequest {
        provider: &'static str,
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("unexpected response shape: {0}")]
    Extraction(String),

    /// Opportunity references a chain id missing from the chain directory.
    #[error("chain id {chain_id} not present in chain directory")]
    UnknownChain { chain_id: i64 },

    /// New rows do not share the stored table's columns.
    #[error("schema mismatch: stored columns {stored:?}, new columns {incoming:?}")]
    SchemaMismatch {
        stored: Vec<String>,
        incoming: Vec<String>,
    },

    /// Stored object exists but could not be read or decoded.
    #[error("failed to read stored table '{object}': {message}")]
    StorageRead { object: String, message: String },

    /// Merged table could not be written back.
    #[error("failed to write table '{object}': {message}")]
    StorageWrite { object: String, message: String },
}

impl TrackerError {
    pub fn upstream(provider: &'static str, err: impl fmt::Display) -> Self {
        Self::UpstreamRequest {
            provider,
            message: err.to_string(),
        }
    }

    pub fn extraction(err: impl fmt::Display) -> Self {
        Self::Extraction(err.to_string())
    }

    /// Stage of the pipeline this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            TrackerError::UpstreamRequest { .. } => Stage::Fetch,
            TrackerError::Extraction(_) | TrackerError::UnknownChain { .. } => Stage::Extract,
            TrackerError::SchemaMismatch { .. } => Stage::Merge,
            TrackerError::StorageRead { .. } => Stage::Load,
            TrackerError::StorageWrite { .. } => Stage::Store,
        }
    }
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;
