//! Pricing

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rusty_money::{Money, iso::Currency};
use thiserror::Error;

use crate::entries::{CartEntry, ItemId};

/// Errors that can occur while totalling a cart.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PricingError {
    /// An entry's line total did not fit in a decimal.
    #[error("line total for item {0} overflowed")]
    LineOverflow(ItemId),

    /// The running total did not fit in a decimal.
    #[error("cart total overflowed")]
    TotalOverflow,

    /// The amount could not be expressed in the currency's minor units.
    #[error("amount {0} cannot be expressed in {1} minor units")]
    MinorUnits(Decimal, &'static str),
}

/// Calculates the total price of a list of entries
///
/// # Errors
///
/// - [`PricingError::LineOverflow`]: an entry's price times quantity overflowed.
/// - [`PricingError::TotalOverflow`]: the sum of line totals overflowed.
pub fn subtotal(entries: &[CartEntry]) -> Result<Decimal, PricingError> {
    entries.iter().try_fold(Decimal::ZERO, |acc, entry| {
        let line = entry
            .line_total()
            .ok_or(PricingError::LineOverflow(entry.id))?;

        acc.checked_add(line).ok_or(PricingError::TotalOverflow)
    })
}

/// Total number of units across the entries.
pub fn total_quantity(entries: &[CartEntry]) -> u64 {
    entries.iter().map(|entry| u64::from(entry.quantity)).sum()
}

/// Convert a decimal amount into money, rounding half away from zero to the currency's
/// minor unit.
///
/// # Errors
///
/// Returns [`PricingError::MinorUnits`] if the amount does not fit in `i64` minor units.
pub fn to_money(
    amount: Decimal,
    currency: &'static Currency,
) -> Result<Money<'static, Currency>, PricingError> {
    let out_of_range = || PricingError::MinorUnits(amount, currency.iso_alpha_code);

    let scale = 10_i64
        .checked_pow(currency.exponent)
        .map(Decimal::from)
        .ok_or_else(out_of_range)?;

    let minor = amount
        .checked_mul(scale)
        .map(|value| value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|value| value.to_i64())
        .ok_or_else(out_of_range)?;

    Ok(Money::from_minor(minor, currency))
}
