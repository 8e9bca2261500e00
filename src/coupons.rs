//! Coupons
//!
//! Order-level discounts attached to a cart. A coupon only stays applied while the cart
//! subtotal meets its minimum order amount.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discounts::{Discount, DiscountError, DiscountKind, LegacyDiscount};

/// Coupon identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponId(pub u64);

impl fmt::Display for CouponId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coupon validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CouponError {
    /// Coupon code was empty.
    #[error("coupon code must not be blank")]
    BlankCode,

    /// A coupon must carry a percentage or fixed discount.
    #[error("coupon {0} has no discount")]
    NoDiscount(String),

    /// Minimum order amount was negative.
    #[error("minimum order amount must not be negative, got {0}")]
    NegativeMinimum(Decimal),

    /// The discount value is out of range.
    #[error(transparent)]
    Discount(#[from] DiscountError),
}

/// Whether a coupon survived revalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponStatus {
    /// Still applied, amount refreshed.
    Kept,

    /// Removed because the subtotal fell below the minimum.
    Dropped,

    /// Removed because the subtotal could not be computed.
    Unpriced,
}

/// A coupon applied to a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "AppliedCouponRecord")]
pub struct AppliedCoupon {
    /// Coupon id
    pub id: CouponId,

    /// Code entered by the customer
    pub code: String,

    /// Discount rule
    pub discount: Discount,

    /// Discount currently granted on the cart subtotal
    pub discount_amount: Decimal,

    /// Minimum subtotal for the coupon to apply
    pub min_order_amount: Decimal,
}

impl AppliedCoupon {
    /// Create a coupon. The granted amount is computed when it is applied to a cart.
    pub fn new(
        id: CouponId,
        code: impl Into<String>,
        discount: Discount,
        min_order_amount: Decimal,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            discount,
            discount_amount: Decimal::ZERO,
            min_order_amount,
        }
    }

    /// Check the coupon is well formed.
    ///
    /// # Errors
    ///
    /// Returns a [`CouponError`] for a blank code, a missing or out of range discount, or a
    /// negative minimum order amount.
    pub fn validate(&self) -> Result<(), CouponError> {
        if self.code.trim().is_empty() {
            return Err(CouponError::BlankCode);
        }

        if self.discount.is_none() {
            return Err(CouponError::NoDiscount(self.code.clone()));
        }

        self.discount.validate()?;

        if self.min_order_amount.is_sign_negative() && !self.min_order_amount.is_zero() {
            return Err(CouponError::NegativeMinimum(self.min_order_amount));
        }

        Ok(())
    }

    /// Whether `subtotal` meets the minimum order amount.
    pub fn is_eligible(&self, subtotal: Decimal) -> bool {
        subtotal >= self.min_order_amount
    }

    /// Recompute the granted amount for `subtotal`.
    ///
    /// Percentage coupons scale with the subtotal (rounded to cents); fixed coupons keep
    /// their value but never exceed the subtotal.
    pub fn refresh(&mut self, subtotal: Decimal) {
        self.discount_amount = match self.discount {
            Discount::None => Decimal::ZERO,
            Discount::Percentage(percent) => subtotal.checked_mul(percent).map_or(subtotal, |v| {
                (v / Decimal::ONE_HUNDRED)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            }),
            Discount::Fixed(amount) => amount.min(subtotal),
        };
    }
}

/// Wire shape of a coupon, accepting the fields written by older clients.
///
/// Older clients store `discount_type` next to `discount_percent` and `discount_amount`,
/// where the amount doubles as the value of a fixed coupon.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppliedCouponRecord {
    id: CouponId,

    #[serde(alias = "coupon_code")]
    code: String,

    #[serde(default)]
    discount: Option<Discount>,

    #[serde(default, alias = "discount_type")]
    discount_type: Option<DiscountKind>,

    #[serde(default, alias = "discount_percent")]
    discount_percent: Option<Decimal>,

    #[serde(default, alias = "discount_amount")]
    discount_amount: Option<Decimal>,

    #[serde(default, alias = "min_order_amount")]
    min_order_amount: Decimal,
}

impl From<AppliedCouponRecord> for AppliedCoupon {
    fn from(record: AppliedCouponRecord) -> Self {
        let discount = record.discount.unwrap_or_else(|| {
            Discount::reconcile(
                LegacyDiscount {
                    kind: record.discount_type,
                    percent: record.discount_percent,
                    amount: record.discount_amount,
                    price: None,
                },
                Decimal::ZERO,
            )
        });

        Self {
            id: record.id,
            code: record.code,
            discount,
            discount_amount: record.discount_amount.unwrap_or_default(),
            min_order_amount: record.min_order_amount,
        }
    }
}

/// Revalidate an optional coupon against a new subtotal, dropping it when ineligible.
pub(crate) fn revalidate(
    coupon: &mut Option<AppliedCoupon>,
    subtotal: Decimal,
) -> Option<CouponStatus> {
    let applied = coupon.as_mut()?;

    if applied.is_eligible(subtotal) {
        applied.refresh(subtotal);

        Some(CouponStatus::Kept)
    } else {
        *coupon = None;

        Some(CouponStatus::Dropped)
    }
}
