//! Upstream data providers.
//!
//! ## Balances
//! REST API returning per-app balances of a wallet, authenticated with HTTP
//! Basic auth. Results are computed asynchronously after a warm-up POST.
//!
//! ## Opportunities
//! GraphQL API returning yield opportunities and the chain directory,
//! authenticated with an `x-api-key` header.

mod balances;
mod opportunities;
pub mod traits;
mod types;

pub use balances::BalanceClient;
pub use opportunities::{OpportunityClient, CHAINS_QUERY, OPPORTUNITIES_QUERY};
pub use traits::{BalanceSource, OpportunitySource};
pub use types::*;
