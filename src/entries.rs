//! Cart Entries

use std::fmt;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::discounts::{Discount, DiscountError, DiscountKind, LegacyDiscount};

/// Item identifier, unique within one user's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the merchant (shop) that sells an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantId(pub u64);

impl fmt::Display for MerchantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free-form item options such as size or toppings.
pub type Customization = FxHashMap<String, Value>;

/// Reasons an entry is not allowed into a cart.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntryError {
    /// Quantity was zero.
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    /// Unit price was below zero.
    #[error("price must not be negative, got {0}")]
    NegativePrice(Decimal),

    /// The discount is out of range.
    #[error(transparent)]
    Discount(#[from] DiscountError),
}

/// One line item in a user's cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "CartEntryRecord")]
pub struct CartEntry {
    /// Item id
    pub id: ItemId,

    /// Display name
    pub name: String,

    /// Unit price as charged, after any item discount
    pub price: Decimal,

    /// Number of units
    pub quantity: u32,

    /// Owning merchant
    pub merchant_id: MerchantId,

    /// Item-level discount
    #[serde(default, skip_serializing_if = "Discount::is_none")]
    pub discount: Discount,

    /// Image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Item options
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub customization: Customization,
}

impl CartEntry {
    /// Create an entry with no discount, image or customization.
    pub fn new(
        id: ItemId,
        name: impl Into<String>,
        price: Decimal,
        quantity: u32,
        merchant_id: MerchantId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            quantity,
            merchant_id,
            discount: Discount::None,
            image: None,
            customization: Customization::default(),
        }
    }

    /// Set the item discount.
    #[must_use]
    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = discount;
        self
    }

    /// Set the image URL.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Add one customization option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.customization.insert(key.into(), value.into());
        self
    }

    /// Check the entry invariants: positive quantity, non-negative price, valid discount.
    ///
    /// # Errors
    ///
    /// Returns the first [`EntryError`] found.
    pub fn validate(&self) -> Result<(), EntryError> {
        if self.quantity == 0 {
            return Err(EntryError::ZeroQuantity);
        }

        if self.price.is_sign_negative() && !self.price.is_zero() {
            return Err(EntryError::NegativePrice(self.price));
        }

        self.discount.validate()?;

        Ok(())
    }

    /// Price of all units of this entry, `None` on overflow.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Wire shape of an entry, accepting fields written by older clients.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartEntryRecord {
    id: ItemId,

    #[serde(default)]
    name: Option<String>,

    price: Decimal,

    quantity: u32,

    #[serde(alias = "merchant_id")]
    merchant_id: MerchantId,

    #[serde(default)]
    discount: Option<Discount>,

    #[serde(default, rename = "type")]
    legacy_kind: Option<DiscountKind>,

    #[serde(default, alias = "discount_percent")]
    discount_percent: Option<Decimal>,

    #[serde(default, alias = "discount_amount")]
    discount_amount: Option<Decimal>,

    #[serde(default, alias = "discount_price")]
    discount_price: Option<Decimal>,

    #[serde(default)]
    image: Option<String>,

    #[serde(default)]
    customization: Option<Customization>,
}

impl From<CartEntryRecord> for CartEntry {
    fn from(record: CartEntryRecord) -> Self {
        let discount = record.discount.unwrap_or_else(|| {
            Discount::reconcile(
                LegacyDiscount {
                    kind: record.legacy_kind,
                    percent: record.discount_percent,
                    amount: record.discount_amount,
                    price: record.discount_price,
                },
                record.price,
            )
        });

        let name = record
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Product {}", record.id));

        Self {
            id: record.id,
            name,
            price: record.price,
            quantity: record.quantity,
            merchant_id: record.merchant_id,
            discount,
            image: record.image,
            customization: record.customization.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use testresult::TestResult;

    use super::*;

    fn tea() -> CartEntry {
        CartEntry::new(ItemId(1), "Tea", Decimal::new(25, 1), 2, MerchantId(9))
    }

    #[test]
    fn valid_entry_passes_validation() {
        assert_eq!(tea().validate(), Ok(()));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut entry = tea();
        entry.quantity = 0;

        assert_eq!(entry.validate(), Err(EntryError::ZeroQuantity));
    }

    #[test]
    fn negative_price_is_rejected() {
        let mut entry = tea();
        entry.price = Decimal::new(-1, 0);

        assert_eq!(
            entry.validate(),
            Err(EntryError::NegativePrice(Decimal::new(-1, 0)))
        );
    }

    #[test]
    fn free_item_is_allowed() {
        let mut entry = tea();
        entry.price = Decimal::ZERO;

        assert_eq!(entry.validate(), Ok(()));
    }

    #[test]
    fn invalid_discount_is_rejected() {
        let entry = tea().with_discount(Discount::Percentage(Decimal::ONE_HUNDRED));

        assert!(matches!(entry.validate(), Err(EntryError::Discount(_))));
    }

    #[test]
    fn line_total_multiplies_quantity() {
        assert_eq!(tea().line_total(), Some(Decimal::new(5, 0)));
    }

    #[test]
    fn builder_sets_optional_fields() {
        let entry = tea()
            .with_image("https://cdn.example/tea.png")
            .with_option("size", "large");

        assert_eq!(entry.image.as_deref(), Some("https://cdn.example/tea.png"));
        assert_eq!(entry.customization.get("size"), Some(&json!("large")));
    }

    #[test]
    fn deserializes_legacy_entry() -> TestResult {
        let entry: CartEntry = serde_json::from_value(json!({
            "id": 4,
            "price": 9,
            "quantity": 1,
            "merchant_id": 2,
            "type": "fixed",
            "discount_amount": "1.50",
            "customization": { "spice": "mild" }
        }))?;

        assert_eq!(entry.name, "Product 4");
        assert_eq!(entry.merchant_id, MerchantId(2));
        assert_eq!(entry.discount, Discount::Fixed(Decimal::new(150, 2)));
        assert_eq!(entry.customization.get("spice"), Some(&json!("mild")));

        Ok(())
    }

    #[test]
    fn serializes_in_camel_case() -> TestResult {
        let value = serde_json::to_value(tea().with_discount(Discount::Fixed(Decimal::ONE)))?;

        assert_eq!(value["merchantId"], 9);
        assert_eq!(value["discount"]["kind"], "fixed");
        assert!(value.get("image").is_none());

        Ok(())
    }
}
