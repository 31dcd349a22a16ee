//! The two dataset jobs.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::{Dataset, DatasetJob};
use crate::error::TrackerResult;
use crate::extract::{extract_balance_rows, extract_opportunity_rows};
use crate::provider::{BalanceSource, OpportunitySource};
use crate::table::{ApyRow, BalanceRow};

/// Per-app balances of one wallet.
pub struct BalancesJob<S> {
    source: S,
    address: String,
    network: String,
}

impl<S: BalanceSource> BalancesJob<S> {
    pub fn new(source: S, address: &str, network: &str) -> Self {
        Self {
            source,
            address: address.to_string(),
            network: network.to_string(),
        }
    }
}

#[async_trait]
impl<S: BalanceSource> DatasetJob for BalancesJob<S> {
    type Row = BalanceRow;

    fn dataset(&self) -> Dataset {
        Dataset::Balances
    }

    async fn collect(&self) -> TrackerResult<Vec<BalanceRow>> {
        let raw = self.source.fetch_balances(&self.address, &self.network).await?;
        extract_balance_rows(&raw)
    }
}

/// Lending and stablecoin APYs across chains.
pub struct ApyJob<S> {
    source: S,
    fixed_date: Option<NaiveDate>,
}

impl<S: OpportunitySource> ApyJob<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            fixed_date: None,
        }
    }

    /// Stamp rows with `date` instead of today's UTC date.
    pub fn with_fixed_date(mut self, date: NaiveDate) -> Self {
        self.fixed_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.fixed_date.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[async_trait]
impl<S: OpportunitySource> DatasetJob for ApyJob<S> {
    type Row = ApyRow;

    fn dataset(&self) -> Dataset {
        Dataset::Apy
    }

    async fn collect(&self) -> TrackerResult<Vec<ApyRow>> {
        let (chains, raw) = self.source.fetch_opportunities().await?;
        extract_opportunity_rows(&raw, &chains, self.today())
    }
}
