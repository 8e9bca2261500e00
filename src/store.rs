//! Cart Store
//!
//! The only mutation surface for cart state. Every operation runs to completion before it
//! returns and either applies fully or leaves the state untouched. A cart's version moves
//! up by exactly one per applied mutation and never moves on a no-op.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    carts::{CartState, CartSummary, UserCart, UserId},
    clock::{Clock, SystemClock},
    coupons::{AppliedCoupon, CouponError, CouponStatus},
    entries::{CartEntry, EntryError, ItemId, MerchantId},
    pricing::PricingError,
};

/// Reasons a cart mutation was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CartError {
    /// The user id was empty or whitespace.
    #[error("user id must not be blank")]
    BlankUser,

    /// The entry broke an entry invariant.
    #[error("invalid cart entry: {0}")]
    InvalidEntry(#[from] EntryError),

    /// The cart already holds items from another merchant.
    #[error("cart holds items from merchant {existing}, cannot add one from merchant {incoming}")]
    MerchantConflict {
        /// Merchant already in the cart
        existing: MerchantId,
        /// Merchant of the rejected entry
        incoming: MerchantId,
    },

    /// Merging quantities would overflow.
    #[error("quantity of item {0} would overflow")]
    QuantityOverflow(ItemId),

    /// The coupon is malformed.
    #[error("invalid coupon: {0}")]
    InvalidCoupon(#[from] CouponError),

    /// The cart subtotal does not reach the coupon's minimum.
    #[error("subtotal {subtotal} is below the coupon minimum of {minimum}")]
    CouponBelowMinimum {
        /// Current subtotal
        subtotal: Decimal,
        /// Coupon minimum order amount
        minimum: Decimal,
    },

    /// Totals could not be computed.
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// Outcome of a mutation that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Change {
    /// State changed.
    Applied,

    /// Nothing to do: unknown item or cart, or the value was already set.
    Unchanged,
}

impl Change {
    /// Whether the state changed.
    pub fn is_applied(self) -> bool {
        matches!(self, Change::Applied)
    }

    /// Combine two outcomes, applied if either was.
    pub fn or(self, other: Change) -> Change {
        if self.is_applied() || other.is_applied() {
            Change::Applied
        } else {
            Change::Unchanged
        }
    }
}

/// What to do when an added item comes from a different merchant than the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MerchantConflict {
    /// Empty the cart (and its coupon) and start over with the new item.
    #[default]
    Replace,

    /// Leave the cart alone and report [`CartError::MerchantConflict`].
    Reject,
}

/// Cart state plus the operations that change it.
#[derive(Debug)]
pub struct CartStore<C: Clock = SystemClock> {
    state: CartState,
    clock: C,
    guest: UserId,
}

impl CartStore<SystemClock> {
    /// An empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for CartStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> CartStore<C> {
    /// An empty store stamping carts with `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: CartState::new(),
            clock,
            guest: UserId::guest(),
        }
    }

    /// Use `guest` as the fallback user id.
    #[must_use]
    pub fn with_guest(mut self, guest: UserId) -> Self {
        self.guest = guest;
        self
    }

    /// The whole state, read-only.
    pub fn state(&self) -> &CartState {
        &self.state
    }

    /// Consume the store and return its state.
    pub fn into_state(self) -> CartState {
        self.state
    }

    /// The fallback user id.
    pub fn guest(&self) -> &UserId {
        &self.guest
    }

    /// The current user, or the guest when nobody is set.
    pub fn active_user(&self) -> &UserId {
        self.state.current_user_id().unwrap_or(&self.guest)
    }

    /// One user's cart.
    pub fn cart(&self, user: &str) -> Option<&UserCart> {
        self.state.cart(user)
    }

    /// One user's entries, empty when the user has no cart.
    pub fn items(&self, user: &str) -> &[CartEntry] {
        self.state.cart(user).map(UserCart::items).unwrap_or_default()
    }

    /// The active user's entries.
    pub fn active_items(&self) -> &[CartEntry] {
        self.items(self.active_user().as_str())
    }

    /// A user's cart version, zero when the user has no cart.
    pub fn version(&self, user: &str) -> u64 {
        self.state.cart(user).map_or(0, UserCart::version)
    }

    /// Totals for a user's cart, zeroes when the user has no cart.
    ///
    /// # Errors
    ///
    /// Returns a [`PricingError`] if the subtotal overflows.
    pub fn summary(&self, user: &str) -> Result<CartSummary, PricingError> {
        self.state
            .cart(user)
            .map_or(Ok(CartSummary::default()), UserCart::summary)
    }

    /// Set or clear the active user. Never creates a cart.
    ///
    /// A blank user id is ignored.
    pub fn set_current_user(&mut self, user: Option<UserId>) -> Change {
        if user.as_ref().is_some_and(UserId::is_blank) {
            debug!("ignoring blank current user");

            return Change::Unchanged;
        }

        if self.state.current_user_id() == user.as_ref() {
            return Change::Unchanged;
        }

        debug!(user = ?user, "switching current user");

        self.state.set_current_user(user);

        Change::Applied
    }

    /// Add an entry, summing quantities when the id is already in the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::BlankUser`] for a blank user id, [`CartError::InvalidEntry`] for
    /// an entry that breaks an entry invariant, and [`CartError::QuantityOverflow`] if the
    /// merged quantity would overflow.
    #[tracing::instrument(
        name = "cart.store.add_item",
        skip(self, entry),
        fields(user = %user, item_id = %entry.id, quantity = entry.quantity),
        err(level = "debug")
    )]
    pub fn add_item(&mut self, user: &UserId, entry: CartEntry) -> Result<Change, CartError> {
        require_user(user)?;
        entry.validate()?;

        let now = self.clock.now();
        let cart = self.state.cart_or_insert(user, now);

        merge_entry(cart, entry)?;

        let version = cart.touch(now);

        log_coupon_status(user, cart.revalidate_coupon());

        debug!(version, "added item");

        Ok(Change::Applied)
    }

    /// Add an entry while keeping the cart to a single merchant.
    ///
    /// # Errors
    ///
    /// As [`CartStore::add_item`], plus [`CartError::MerchantConflict`] when `on_conflict`
    /// is [`MerchantConflict::Reject`] and the cart holds another merchant's items.
    #[tracing::instrument(
        name = "cart.store.add_item_with_merchant_check",
        skip(self, entry),
        fields(user = %user, item_id = %entry.id, merchant_id = %entry.merchant_id),
        err(level = "debug")
    )]
    pub fn add_item_with_merchant_check(
        &mut self,
        user: &UserId,
        entry: CartEntry,
        on_conflict: MerchantConflict,
    ) -> Result<Change, CartError> {
        require_user(user)?;
        entry.validate()?;

        let existing = self.state.cart(user.as_str()).and_then(UserCart::merchant);

        let replace = match existing {
            Some(existing) if existing != entry.merchant_id => match on_conflict {
                MerchantConflict::Replace => true,
                MerchantConflict::Reject => {
                    return Err(CartError::MerchantConflict {
                        existing,
                        incoming: entry.merchant_id,
                    });
                }
            },
            _ => false,
        };

        let now = self.clock.now();
        let cart = self.state.cart_or_insert(user, now);

        if replace {
            info!(user = %user, "replacing cart contents with items from another merchant");

            cart.replace_items(Vec::new());
            cart.take_coupon();
        }

        merge_entry(cart, entry)?;

        cart.touch(now);

        log_coupon_status(user, cart.revalidate_coupon());

        Ok(Change::Applied)
    }

    /// Set an entry's quantity; zero removes the entry.
    ///
    /// Unknown users or items, and a quantity equal to the current one, are no-ops.
    #[tracing::instrument(
        name = "cart.store.update_item_quantity",
        skip(self),
        fields(user = %user)
    )]
    pub fn update_item_quantity(
        &mut self,
        user: &UserId,
        item_id: ItemId,
        quantity: u32,
    ) -> Change {
        if quantity == 0 {
            return self.remove_item(user, item_id);
        }

        let now = self.clock.now();

        let Some(cart) = self.state.cart_mut(user.as_str()) else {
            return Change::Unchanged;
        };

        let Some(entry) = cart.get_mut(item_id) else {
            return Change::Unchanged;
        };

        if entry.quantity == quantity {
            return Change::Unchanged;
        }

        entry.quantity = quantity;

        cart.touch(now);

        log_coupon_status(user, cart.revalidate_coupon());

        Change::Applied
    }

    /// Take one unit off an entry, removing it when it reaches zero.
    pub fn decrease_item_quantity(&mut self, user: &UserId, item_id: ItemId) -> Change {
        let quantity = match self.state.cart(user.as_str()).and_then(|cart| cart.get(item_id)) {
            Some(entry) => entry.quantity,
            None => return Change::Unchanged,
        };

        if quantity > 1 {
            self.update_item_quantity(user, item_id, quantity - 1)
        } else {
            self.remove_item(user, item_id)
        }
    }

    /// Remove an entry by id. Unknown ids are no-ops.
    #[tracing::instrument(name = "cart.store.remove_item", skip(self), fields(user = %user))]
    pub fn remove_item(&mut self, user: &UserId, item_id: ItemId) -> Change {
        let now = self.clock.now();

        let Some(cart) = self.state.cart_mut(user.as_str()) else {
            return Change::Unchanged;
        };

        if !cart.remove(item_id) {
            return Change::Unchanged;
        }

        cart.touch(now);

        log_coupon_status(user, cart.revalidate_coupon());

        Change::Applied
    }

    /// Empty one user's cart and drop its coupon. Other users are untouched.
    #[tracing::instrument(name = "cart.store.clear_cart", skip(self), fields(user = %user))]
    pub fn clear_cart(&mut self, user: &UserId) -> Change {
        let now = self.clock.now();

        let Some(cart) = self.state.cart_mut(user.as_str()) else {
            return Change::Unchanged;
        };

        if cart.is_empty() && cart.applied_coupon().is_none() {
            return Change::Unchanged;
        }

        cart.replace_items(Vec::new());
        cart.take_coupon();
        cart.touch(now);

        Change::Applied
    }

    /// Drop every cart and the active user.
    pub fn clear_all(&mut self) -> Change {
        if self.state.is_empty() {
            return Change::Unchanged;
        }

        info!(carts = self.state.carts().len(), "clearing all carts");

        self.state = CartState::new();

        Change::Applied
    }

    /// Move `source`'s cart into `target`'s and delete the source cart.
    ///
    /// Items from the same merchant are merged, summing quantities for equal ids. When the
    /// merchants differ the target's items are replaced by the source's. The source coupon
    /// is carried over unless the target already has one from the same merchant.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::BlankUser`] for a blank target and
    /// [`CartError::QuantityOverflow`] if a merged quantity would overflow; the state is
    /// unchanged in either case.
    #[tracing::instrument(
        name = "cart.store.merge_carts",
        skip(self),
        fields(source = %source, target = %target),
        err(level = "debug")
    )]
    pub fn merge_carts(&mut self, source: &UserId, target: &UserId) -> Result<Change, CartError> {
        require_user(target)?;

        if source == target {
            return Ok(Change::Unchanged);
        }

        let Some(source_cart) = self.state.cart(source.as_str()) else {
            return Ok(Change::Unchanged);
        };

        let plan = plan_merge(source_cart, self.state.cart(target.as_str()))?;

        let now = self.clock.now();

        self.state.remove_cart(source.as_str());

        if let Some((items, coupon)) = plan {
            let cart = self.state.cart_or_insert(target, now);

            cart.replace_items(items);
            cart.set_coupon(coupon);

            let version = cart.touch(now);

            log_coupon_status(target, cart.revalidate_coupon());

            info!(version, "merged carts");
        }

        Ok(Change::Applied)
    }

    /// Log `user` in: a guest cart is merged into theirs, then they become the active user.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::BlankUser`] for a blank user id and propagates
    /// [`CartError::QuantityOverflow`] from the merge.
    pub fn login(&mut self, user: UserId) -> Result<Change, CartError> {
        require_user(&user)?;

        let from_guest = self
            .state
            .current_user_id()
            .is_none_or(|current| *current == self.guest);

        let merged = if from_guest && user != self.guest {
            let guest = self.guest.clone();

            self.merge_carts(&guest, &user)?
        } else {
            Change::Unchanged
        };

        Ok(merged.or(self.set_current_user(Some(user))))
    }

    /// Clear the active user. Carts are kept.
    pub fn logout(&mut self) -> Change {
        self.set_current_user(None)
    }

    /// Attach a coupon to a user's cart, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::BlankUser`] for a blank user id, [`CartError::InvalidCoupon`]
    /// for a malformed coupon and [`CartError::CouponBelowMinimum`] when the subtotal is
    /// too low.
    #[tracing::instrument(
        name = "cart.store.apply_coupon",
        skip(self, coupon),
        fields(user = %user, code = %coupon.code),
        err(level = "debug")
    )]
    pub fn apply_coupon(
        &mut self,
        user: &UserId,
        mut coupon: AppliedCoupon,
    ) -> Result<Change, CartError> {
        require_user(user)?;
        coupon.validate()?;

        let subtotal = self
            .state
            .cart(user.as_str())
            .map_or(Ok(Decimal::ZERO), UserCart::subtotal)?;

        if !coupon.is_eligible(subtotal) {
            return Err(CartError::CouponBelowMinimum {
                subtotal,
                minimum: coupon.min_order_amount,
            });
        }

        coupon.refresh(subtotal);

        let now = self.clock.now();
        let cart = self.state.cart_or_insert(user, now);

        cart.set_coupon(Some(coupon));
        cart.touch(now);

        Ok(Change::Applied)
    }

    /// Detach the coupon from a user's cart.
    pub fn remove_coupon(&mut self, user: &UserId) -> Change {
        let now = self.clock.now();

        let Some(cart) = self.state.cart_mut(user.as_str()) else {
            return Change::Unchanged;
        };

        if cart.take_coupon().is_none() {
            return Change::Unchanged;
        }

        cart.touch(now);

        Change::Applied
    }

    /// Install a restored state.
    ///
    /// Restored carts replace in-memory ones unless the in-memory cart has already moved
    /// past the restored version. An active user set before hydration is kept.
    pub fn hydrate(&mut self, restored: CartState) {
        let (carts, current_user_id) = restored.into_parts();

        for (user, cart) in carts {
            let in_memory = self.state.cart(user.as_str()).map(UserCart::version);

            match in_memory {
                Some(version) if version > cart.version() => {
                    debug!(
                        user = %user,
                        version,
                        restored = cart.version(),
                        "keeping newer in-memory cart"
                    );
                }
                _ => self.state.insert_cart(user, cart),
            }
        }

        if self.state.current_user_id().is_none() {
            self.state.set_current_user(current_user_id);
        }
    }
}

/// Merge `entry` into `cart`, summing quantities on a matching id.
fn merge_entry(cart: &mut UserCart, entry: CartEntry) -> Result<(), CartError> {
    match cart.get_mut(entry.id) {
        Some(existing) => {
            existing.quantity = existing
                .quantity
                .checked_add(entry.quantity)
                .ok_or(CartError::QuantityOverflow(entry.id))?;
        }
        None => cart.push(entry),
    }

    Ok(())
}

type MergePlan = Option<(Vec<CartEntry>, Option<AppliedCoupon>)>;

/// Work out the target cart's new items and coupon without touching either cart.
fn plan_merge(source: &UserCart, target: Option<&UserCart>) -> Result<MergePlan, CartError> {
    if source.is_empty() {
        return Ok(None);
    }

    let source_coupon = source.applied_coupon().cloned();

    let Some(target) = target.filter(|cart| !cart.is_empty()) else {
        let coupon = source_coupon.or_else(|| target.and_then(|t| t.applied_coupon().cloned()));

        return Ok(Some((source.items().to_vec(), coupon)));
    };

    if source.merchant() != target.merchant() {
        return Ok(Some((source.items().to_vec(), source_coupon)));
    }

    let mut items = target.items().to_vec();

    for incoming in source.items() {
        match items.iter_mut().find(|entry| entry.id == incoming.id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(incoming.quantity)
                    .ok_or(CartError::QuantityOverflow(incoming.id))?;
            }
            None => items.push(incoming.clone()),
        }
    }

    let coupon = target.applied_coupon().cloned().or(source_coupon);

    Ok(Some((items, coupon)))
}

/// Reject blank user ids; they cannot key a persisted cart.
fn require_user(user: &UserId) -> Result<(), CartError> {
    if user.is_blank() {
        return Err(CartError::BlankUser);
    }

    Ok(())
}

fn log_coupon_status(user: &UserId, status: Option<CouponStatus>) {
    match status {
        Some(CouponStatus::Dropped) => {
            info!(user = %user, "coupon removed: subtotal below minimum order amount");
        }
        Some(CouponStatus::Unpriced) => {
            warn!(user = %user, "coupon removed: cart subtotal overflowed");
        }
        Some(CouponStatus::Kept) | None => {}
    }
}
