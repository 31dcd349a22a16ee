//! Response types for the balance and yield providers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==================== Balances (REST) ====================

/// Raw response of the app balances endpoint.
pub type RawBalanceResponse = Vec<AppBalance>;

/// Balance of the tracked address inside one app.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppBalance {
    pub app_name: String,
    pub network: String,
    pub updated_at: String,
    #[serde(rename = "balanceUSD")]
    pub balance_usd: Decimal,
    #[serde(default)]
    pub products: Vec<AppProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppProduct {
    #[serde(default)]
    pub assets: Vec<ProductAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductAsset {
    #[serde(default)]
    pub tokens: Vec<AssetToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetToken {
    pub symbol: String,
    pub balance: Decimal,
}

// ==================== Opportunities (GraphQL) ====================

/// GraphQL request body.
#[derive(Debug, Clone, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
}

/// GraphQL response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainsData {
    pub chains: Vec<Chain>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chain {
    pub id: i64,
    pub name: String,
}

/// Raw response of the opportunities query.
///
/// Entries stay untyped until they pass the category filter, so a malformed
/// opportunity outside the tracked categories cannot fail the run.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOpportunityResponse {
    pub opportunities: Vec<serde_json::Value>,
}

/// A tracked opportunity, decoded from its raw entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    /// Fractional rate, e.g. 0.0532 for 5.32%
    pub apr: Decimal,
    #[serde(default)]
    pub categories: Vec<String>,
    pub chain_id: i64,
    #[serde(default)]
    pub farm: Option<Farm>,
    #[serde(default)]
    pub deposit_tokens: Vec<DepositToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Farm {
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositToken {
    pub display_name: String,
}

/// Run-scoped lookup from chain id to display name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainDirectory(HashMap<i64, String>);

impl ChainDirectory {
    pub fn name(&self, chain_id: i64) -> Option<&str> {
        self.0.get(&chain_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Chain>> for ChainDirectory {
    fn from(chains: Vec<Chain>) -> Self {
        Self(chains.into_iter().map(|c| (c.id, c.name)).collect())
    }
}

impl FromIterator<(i64, String)> for ChainDirectory {
    fn from_iter<I: IntoIterator<Item = (i64, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
