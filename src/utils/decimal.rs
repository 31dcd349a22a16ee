//! Decimal helpers for rates and table cells.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Convert a fractional rate to a percentage (0.0532 -> 5.32).
///
/// Returns `None` when the result does not fit in a `Decimal`.
pub fn rate_to_percentage(rate: Decimal) -> Option<Decimal> {
    rate.checked_mul(dec!(100))
}

/// Render a decimal for a table cell without trailing zeros.
///
/// `5.3200` becomes `5.32`, `12.0` becomes `12`.
pub fn to_cell(value: Decimal) -> String {
    value.normalize().to_string()
}
