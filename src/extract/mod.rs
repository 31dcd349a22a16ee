//! Flattening of provider responses into table rows.
//!
//! Both extractors are pure: the only ambient input, the current date for APY
//! rows, is passed in by the caller.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{TrackerError, TrackerResult};
use crate::provider::{
    AppBalance, AssetToken, ChainDirectory, Opportunity, RawBalanceResponse, RawOpportunityResponse,
};
use crate::table::{ApyRow, BalanceRow};
use crate::utils::decimal::rate_to_percentage;

/// Categories an opportunity must carry (at least one) to be tracked.
pub const TRACKED_CATEGORIES: &[&str] = &["lending", "stablecoin"];

/// One row per app entry, using the first token of the first asset of the
/// first product as the representative position.
///
/// An entry without that token aborts the whole extraction.
pub fn extract_balance_rows(response: &RawBalanceResponse) -> TrackerResult<Vec<BalanceRow>> {
    response
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let token = representative_token(entry).ok_or_else(|| {
                TrackerError::Extraction(format!(
                    "balance entry {} ({}) has no products[0].assets[0].tokens[0]",
                    idx, entry.app_name
                ))
            })?;

            Ok(BalanceRow {
                app_name: entry.app_name.clone(),
                network: entry.network.clone(),
                updated_at: entry.updated_at.clone(),
                token: token.symbol.clone(),
                balance: token.balance,
                usd_value: entry.balance_usd,
            })
        })
        .collect()
}

fn representative_token(entry: &AppBalance) -> Option<&AssetToken> {
    entry
        .products
        .first()?
        .assets
        .first()?
        .tokens
        .first()
}

/// Whether a raw opportunity belongs to a tracked category.
///
/// Only `categories` is inspected, so the rest of the entry may be malformed.
pub fn is_tracked(opportunity: &Value) -> bool {
    opportunity
        .get("categories")
        .and_then(Value::as_array)
        .is_some_and(|categories| {
            categories
                .iter()
                .filter_map(Value::as_str)
                .any(|c| TRACKED_CATEGORIES.contains(&c))
        })
}

/// One row per tracked opportunity, dated `today`.
///
/// Entries are decoded only after they pass the category filter.
pub fn extract_opportunity_rows(
    response: &RawOpportunityResponse,
    chains: &ChainDirectory,
    today: NaiveDate,
) -> TrackerResult<Vec<ApyRow>> {
    response
        .opportunities
        .iter()
        .enumerate()
        .filter(|(_, raw)| is_tracked(raw))
        .map(|(idx, raw)| {
            let opp = Opportunity::deserialize(raw).map_err(|e| {
                TrackerError::Extraction(format!("opportunity {}: {}", idx, e))
            })?;
            opportunity_row(&opp, chains, today)
        })
        .collect()
}

fn opportunity_row(
    opp: &Opportunity,
    chains: &ChainDirectory,
    today: NaiveDate,
) -> TrackerResult<ApyRow> {
    let network = chains
        .name(opp.chain_id)
        .ok_or(TrackerError::UnknownChain {
            chain_id: opp.chain_id,
        })?;
    let farm = opp.farm.as_ref().ok_or_else(|| {
        TrackerError::Extraction(format!(
            "opportunity on chain {} has no farm",
            opp.chain_id
        ))
    })?;
    let token = opp.deposit_tokens.first().ok_or_else(|| {
        TrackerError::Extraction(format!("opportunity '{}' has no deposit tokens", farm.slug))
    })?;
    let apy = rate_to_percentage(opp.apr).ok_or_else(|| {
        TrackerError::Extraction(format!("apr {} of '{}' is out of range", opp.apr, farm.slug))
    })?;

    Ok(ApyRow {
        defi_protocol: farm.slug.clone(),
        network: network.to_string(),
        updated_at: today,
        token: token.display_name.clone(),
        apy,
    })
}
