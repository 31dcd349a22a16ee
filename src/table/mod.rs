//! Tabular rows and the CSV table they are persisted in.
//!
//! A [`Table`] is untyped: a header plus string records, so a stored table can
//! be carried forward verbatim without re-parsing historic cells. Freshly
//! extracted rows are typed ([`BalanceRow`], [`ApyRow`]) and flattened through
//! [`TableRow`].

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::TrackerError;
use crate::utils::decimal::to_cell;

pub const BALANCE_COLUMNS: &[&str] = &[
    "App Name",
    "Network",
    "Updated At",
    "Token",
    "Balance",
    "USD value",
];

pub const APY_COLUMNS: &[&str] = &["Defi Protocol", "Network", "Updated At", "Token", "APY"];

/// A typed row with a fixed column schema.
pub trait TableRow {
    /// Ordered column names written as the table header.
    const COLUMNS: &'static [&'static str];

    /// Cell values in `COLUMNS` order.
    fn to_record(&self) -> Vec<String>;
}

/// One app position of the tracked wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRow {
    pub app_name: String,
    pub network: String,
    /// Provider timestamp, kept as the provider formatted it
    pub updated_at: String,
    pub token: String,
    pub balance: Decimal,
    pub usd_value: Decimal,
}

impl TableRow for BalanceRow {
    const COLUMNS: &'static [&'static str] = BALANCE_COLUMNS;

    fn to_record(&self) -> Vec<String> {
        vec![
            self.app_name.clone(),
            self.network.clone(),
            self.updated_at.clone(),
            self.token.clone(),
            self.balance.to_string(),
            self.usd_value.to_string(),
        ]
    }
}

/// One lending/stablecoin yield opportunity observed on a given day.
#[derive(Debug, Clone, PartialEq)]
pub struct ApyRow {
    pub defi_protocol: String,
    pub network: String,
    pub updated_at: NaiveDate,
    pub token: String,
    /// Percentage, e.g. 5.32 for a 0.0532 rate
    pub apy: Decimal,
}

impl TableRow for ApyRow {
    const COLUMNS: &'static [&'static str] = APY_COLUMNS;

    fn to_record(&self) -> Vec<String> {
        vec![
            self.defi_protocol.clone(),
            self.network.clone(),
            self.updated_at.format("%Y-%m-%d").to_string(),
            self.token.clone(),
            to_cell(self.apy),
        ]
    }
}

/// Header plus records, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    records: Vec<Vec<String>>,
}

impl Table {
    /// An empty table with the given header.
    pub fn with_columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            records: Vec::new(),
        }
    }

    /// Build a table from typed rows.
    pub fn from_rows<R: TableRow>(rows: &[R]) -> Self {
        let mut table = Self::with_columns(R::COLUMNS);
        table.records = rows.iter().map(TableRow::to_record).collect();
        table
    }

    /// Decode CSV content with a header row.
    ///
    /// Empty content decodes to a table with no columns.
    pub fn from_csv(content: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content);

        let columns: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut records = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read CSV record {}", idx + 1))?;
            records.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, records })
    }

    /// Encode as CSV with a header row.
    pub fn to_csv(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.write_record(&self.columns)?;
        for record in &self.records {
            wtr.write_record(record)?;
        }
        let data = wtr.into_inner().context("failed to flush CSV writer")?;
        String::from_utf8(data).context("CSV output is not valid UTF-8")
    }

    /// Append `other`'s records after this table's records.
    ///
    /// Columns are matched by name: when both tables carry the same column set
    /// in a different order, incoming cells are reordered into the stored
    /// layout. A table with no header (bootstrap) adopts `other`'s header.
    pub fn append(&mut self, other: Table) -> Result<(), TrackerError> {
        if self.columns.is_empty() && self.records.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.columns == other.columns {
            self.records.extend(other.records);
            return Ok(());
        }

        let positions: Option<Vec<usize>> = if self.columns.len() == other.columns.len() {
            self.columns
                .iter()
                .map(|name| other.columns.iter().position(|c| c == name))
                .collect()
        } else {
            None
        };
        let Some(positions) = positions else {
            return Err(TrackerError::SchemaMismatch {
                stored: self.columns.clone(),
                incoming: other.columns,
            });
        };

        self.records.extend(
            other
                .records
                .into_iter()
                .map(|record| {
                    positions
                        .iter()
                        .map(|&i| record.get(i).cloned().unwrap_or_default())
                        .collect()
                }),
        );
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Vec<String>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
