//! Carts
//!
//! The per-user cart table. Everything here is read-only outside the crate; all mutation
//! goes through [`CartStore`](crate::store::CartStore).

use std::{borrow::Borrow, fmt};

use jiff::Timestamp;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    coupons::{self, AppliedCoupon, CouponStatus},
    entries::{CartEntry, ItemId, MerchantId},
    pricing::{self, PricingError},
};

/// Default id of the cart used while nobody is logged in.
pub const GUEST_USER: &str = "guest";

/// User identifier keying the cart table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The guest user id.
    pub fn guest() -> Self {
        Self::new(GUEST_USER)
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for UserId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Totals for one cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CartSummary {
    /// Units across all entries
    pub total_items: u64,

    /// Sum of line totals
    pub subtotal: Decimal,

    /// Amount taken off by the applied coupon
    pub coupon_discount: Decimal,

    /// Amount payable, never below zero
    pub total: Decimal,
}

/// One user's cart and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCart {
    items: Vec<CartEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    applied_coupon: Option<AppliedCoupon>,

    #[serde(default, with = "jiff::fmt::serde::timestamp::millisecond::required")]
    last_updated: Timestamp,

    #[serde(default)]
    version: u64,
}

impl UserCart {
    /// An empty cart that has never been mutated.
    pub fn new(now: Timestamp) -> Self {
        Self {
            items: Vec::new(),
            applied_coupon: None,
            last_updated: now,
            version: 0,
        }
    }

    /// Entries in display order.
    pub fn items(&self) -> &[CartEntry] {
        &self.items
    }

    /// The applied coupon, if any.
    pub fn applied_coupon(&self) -> Option<&AppliedCoupon> {
        self.applied_coupon.as_ref()
    }

    /// When the cart was last mutated.
    pub fn last_updated(&self) -> Timestamp {
        self.last_updated
    }

    /// Number of applied mutations.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of distinct entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an entry by id.
    pub fn get(&self, id: ItemId) -> Option<&CartEntry> {
        self.items.iter().find(|entry| entry.id == id)
    }

    /// Merchant of the cart, taken from its first entry.
    pub fn merchant(&self) -> Option<MerchantId> {
        self.items.first().map(|entry| entry.merchant_id)
    }

    /// Sum of line totals.
    ///
    /// # Errors
    ///
    /// Returns a [`PricingError`] if the total overflows.
    pub fn subtotal(&self) -> Result<Decimal, PricingError> {
        pricing::subtotal(&self.items)
    }

    /// Item count, subtotal, coupon discount and payable total.
    ///
    /// # Errors
    ///
    /// Returns a [`PricingError`] if the subtotal overflows.
    pub fn summary(&self) -> Result<CartSummary, PricingError> {
        let subtotal = self.subtotal()?;

        let coupon_discount = self
            .applied_coupon
            .as_ref()
            .map_or(Decimal::ZERO, |coupon| coupon.discount_amount.min(subtotal));

        Ok(CartSummary {
            total_items: pricing::total_quantity(&self.items),
            subtotal,
            coupon_discount,
            total: (subtotal - coupon_discount).max(Decimal::ZERO),
        })
    }

    pub(crate) fn get_mut(&mut self, id: ItemId) -> Option<&mut CartEntry> {
        self.items.iter_mut().find(|entry| entry.id == id)
    }

    pub(crate) fn push(&mut self, entry: CartEntry) {
        self.items.push(entry);
    }

    pub(crate) fn remove(&mut self, id: ItemId) -> bool {
        let before = self.items.len();

        self.items.retain(|entry| entry.id != id);

        self.items.len() != before
    }

    pub(crate) fn replace_items(&mut self, items: Vec<CartEntry>) {
        self.items = items;
    }

    pub(crate) fn set_coupon(&mut self, coupon: Option<AppliedCoupon>) {
        self.applied_coupon = coupon;
    }

    pub(crate) fn take_coupon(&mut self) -> Option<AppliedCoupon> {
        self.applied_coupon.take()
    }

    /// Refresh or drop the coupon after the items changed.
    ///
    /// A coupon is dropped when the subtotal overflows, since its amount can no longer be
    /// computed.
    pub(crate) fn revalidate_coupon(&mut self) -> Option<CouponStatus> {
        match self.subtotal() {
            Ok(subtotal) => coupons::revalidate(&mut self.applied_coupon, subtotal),
            Err(_) => self
                .applied_coupon
                .take()
                .map(|_| CouponStatus::Unpriced),
        }
    }

    /// Record an applied mutation.
    pub(crate) fn touch(&mut self, now: Timestamp) -> u64 {
        self.version = self.version.saturating_add(1);
        self.last_updated = now;

        self.version
    }
}

/// The whole cart table plus the active user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
    #[serde(default)]
    carts: FxHashMap<UserId, UserCart>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_user_id: Option<UserId>,
}

impl CartState {
    /// An empty table with no active user.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a state from parts.
    pub fn from_parts(
        carts: FxHashMap<UserId, UserCart>,
        current_user_id: Option<UserId>,
    ) -> Self {
        Self {
            carts,
            current_user_id,
        }
    }

    /// All carts keyed by user.
    pub fn carts(&self) -> &FxHashMap<UserId, UserCart> {
        &self.carts
    }

    /// One user's cart.
    pub fn cart(&self, user: &str) -> Option<&UserCart> {
        self.carts.get(user)
    }

    /// The active user, if one is set.
    pub fn current_user_id(&self) -> Option<&UserId> {
        self.current_user_id.as_ref()
    }

    /// Whether there are no carts and no active user.
    pub fn is_empty(&self) -> bool {
        self.carts.is_empty() && self.current_user_id.is_none()
    }

    pub(crate) fn cart_mut(&mut self, user: &str) -> Option<&mut UserCart> {
        self.carts.get_mut(user)
    }

    /// Get a user's cart, creating an empty one on first use.
    pub(crate) fn cart_or_insert(&mut self, user: &UserId, now: Timestamp) -> &mut UserCart {
        self.carts
            .entry(user.clone())
            .or_insert_with(|| UserCart::new(now))
    }

    pub(crate) fn insert_cart(&mut self, user: UserId, cart: UserCart) {
        self.carts.insert(user, cart);
    }

    pub(crate) fn remove_cart(&mut self, user: &str) -> Option<UserCart> {
        self.carts.remove(user)
    }

    pub(crate) fn set_current_user(&mut self, user: Option<UserId>) {
        self.current_user_id = user;
    }

    pub(crate) fn into_parts(self) -> (FxHashMap<UserId, UserCart>, Option<UserId>) {
        (self.carts, self.current_user_id)
    }
}
