//! Provider-agnostic traits for the two upstream APIs.
//!
//! The pipeline only sees these traits, so a run can be driven by the HTTP
//! clients in production and by canned payloads in tests.

use async_trait::async_trait;

use super::types::{ChainDirectory, RawBalanceResponse, RawOpportunityResponse};
use crate::error::TrackerResult;

/// Source of per-app wallet balances.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Fetch the current app balances of `address` on `network`.
    ///
    /// Implementations trigger a recomputation first and read the result
    /// after the settle delay.
    async fn fetch_balances(&self, address: &str, network: &str)
        -> TrackerResult<RawBalanceResponse>;
}

/// Source of yield opportunities and the chain names they refer to.
#[async_trait]
pub trait OpportunitySource: Send + Sync {
    async fn fetch_opportunities(&self)
        -> TrackerResult<(ChainDirectory, RawOpportunityResponse)>;
}
