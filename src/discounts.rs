//! Discounts
//!
//! A cart entry carries at most one discount. Older snapshots describe the same discount
//! through up to four loosely related fields; [`Discount::reconcile`] folds those into a
//! single variant.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a discount value is out of range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscountError {
    /// Percentage discounts must lie in `[0, 100)`.
    #[error("percentage discount must be at least 0 and below 100, got {0}")]
    PercentOutOfRange(Decimal),

    /// Fixed discounts must not be negative.
    #[error("fixed discount must not be negative, got {0}")]
    NegativeAmount(Decimal),
}

/// Discount kind as written by older clients in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    /// Percentage off the original unit price.
    Percentage,

    /// Fixed amount off the original unit price.
    Fixed,
}

/// The discount already applied to an entry's unit price.
///
/// Entry prices are stored as charged; the discount records how far below the original
/// price they are, so the original price can be derived for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Full price.
    #[default]
    None,

    /// Percentage off, expressed in points (`15` means 15%).
    Percentage(Decimal),

    /// Fixed amount off each unit.
    Fixed(Decimal),
}

/// Loose discount fields as found on legacy snapshot entries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LegacyDiscount {
    /// Declared kind (`type`).
    pub kind: Option<DiscountKind>,

    /// `discount_percent`
    pub percent: Option<Decimal>,

    /// `discount_amount`
    pub amount: Option<Decimal>,

    /// `discount_price`: the discounted unit price.
    pub price: Option<Decimal>,
}

impl Discount {
    /// Check the discount value is in range.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscountError`] when a percentage is outside `[0, 100)` or a fixed
    /// amount is negative.
    pub fn validate(&self) -> Result<(), DiscountError> {
        match *self {
            Discount::None => Ok(()),
            Discount::Percentage(percent) => {
                if percent.is_sign_negative() || percent >= Decimal::ONE_HUNDRED {
                    Err(DiscountError::PercentOutOfRange(percent))
                } else {
                    Ok(())
                }
            }
            Discount::Fixed(amount) => {
                if amount.is_sign_negative() {
                    Err(DiscountError::NegativeAmount(amount))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Whether no discount applies.
    pub fn is_none(&self) -> bool {
        matches!(self, Discount::None)
    }

    /// Fold legacy discount fields into one discount.
    ///
    /// An explicit kind with a positive value wins, then a bare positive amount, then a
    /// discounted price below `unit_price`. Anything else means no discount.
    pub fn reconcile(legacy: LegacyDiscount, unit_price: Decimal) -> Self {
        let positive = |value: Option<Decimal>| value.filter(|v| *v > Decimal::ZERO);

        match (legacy.kind, positive(legacy.percent), positive(legacy.amount)) {
            (Some(DiscountKind::Percentage), Some(percent), _) => Discount::Percentage(percent),
            (Some(DiscountKind::Fixed) | None, _, Some(amount)) => Discount::Fixed(amount),
            _ => match legacy.price {
                Some(discounted) if discounted < unit_price => {
                    Discount::Fixed(unit_price - discounted)
                }
                _ => Discount::None,
            },
        }
    }

    /// Derive the undiscounted unit price from the charged `unit_price`.
    ///
    /// Returns `None` if the percentage would divide by zero.
    pub fn original_unit_price(&self, unit_price: Decimal) -> Option<Decimal> {
        match *self {
            Discount::None => Some(unit_price),
            Discount::Percentage(percent) => {
                let remaining = Decimal::ONE - percent / Decimal::ONE_HUNDRED;

                unit_price.checked_div(remaining)
            }
            Discount::Fixed(amount) => unit_price.checked_add(amount),
        }
    }

    /// Amount saved per unit relative to the original price.
    pub fn unit_savings(&self, unit_price: Decimal) -> Option<Decimal> {
        self.original_unit_price(unit_price)
            .map(|original| original - unit_price)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap_or_default()
    }

    #[test]
    fn percentage_in_range_is_valid() {
        assert!(Discount::Percentage(dec("15")).validate().is_ok());
        assert!(Discount::Percentage(Decimal::ZERO).validate().is_ok());
    }

    #[test]
    fn percentage_of_one_hundred_is_rejected() {
        let result = Discount::Percentage(Decimal::ONE_HUNDRED).validate();

        assert_eq!(
            result,
            Err(DiscountError::PercentOutOfRange(Decimal::ONE_HUNDRED))
        );
    }

    #[test]
    fn negative_fixed_amount_is_rejected() {
        let result = Discount::Fixed(dec("-1")).validate();

        assert_eq!(result, Err(DiscountError::NegativeAmount(dec("-1"))));
    }

    #[test]
    fn reconcile_prefers_declared_percentage() {
        let legacy = LegacyDiscount {
            kind: Some(DiscountKind::Percentage),
            percent: Some(dec("10")),
            amount: Some(dec("3")),
            price: Some(dec("4")),
        };

        assert_eq!(
            Discount::reconcile(legacy, dec("9")),
            Discount::Percentage(dec("10"))
        );
    }

    #[test]
    fn reconcile_uses_amount_without_kind() {
        let legacy = LegacyDiscount {
            amount: Some(dec("1.50")),
            ..LegacyDiscount::default()
        };

        assert_eq!(
            Discount::reconcile(legacy, dec("9")),
            Discount::Fixed(dec("1.50"))
        );
    }

    #[test]
    fn reconcile_falls_back_to_discount_price() {
        let legacy = LegacyDiscount {
            price: Some(dec("7.50")),
            ..LegacyDiscount::default()
        };

        assert_eq!(
            Discount::reconcile(legacy, dec("9")),
            Discount::Fixed(dec("1.50"))
        );
    }

    #[test]
    fn reconcile_ignores_zero_values_and_higher_discount_price() {
        let legacy = LegacyDiscount {
            kind: Some(DiscountKind::Percentage),
            percent: Some(Decimal::ZERO),
            amount: None,
            price: Some(dec("12")),
        };

        assert_eq!(Discount::reconcile(legacy, dec("9")), Discount::None);
    }

    #[test]
    fn original_price_for_percentage() -> TestResult {
        let original = Discount::Percentage(dec("10"))
            .original_unit_price(dec("9"))
            .ok_or("division failed")?;

        assert_eq!(original, dec("10"));

        Ok(())
    }

    #[test]
    fn savings_for_fixed() {
        assert_eq!(
            Discount::Fixed(dec("2")).unit_savings(dec("8")),
            Some(dec("2"))
        );
        assert_eq!(Discount::None.unit_savings(dec("8")), Some(Decimal::ZERO));
    }

    #[test]
    fn serializes_as_tagged_variant() -> TestResult {
        let json = serde_json::to_value(Discount::Percentage(dec("15")))?;

        assert_eq!(json["kind"], "percentage");
        assert_eq!(json["value"], "15");

        let none = serde_json::to_value(Discount::None)?;

        assert_eq!(none["kind"], "none");

        Ok(())
    }
}
