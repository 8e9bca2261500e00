//! Cart Store prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    carts::{CartState, CartSummary, GUEST_USER, UserCart, UserId},
    clock::{Clock, ManualClock, SystemClock},
    config::{ConfigError, StoreConfig},
    coupons::{AppliedCoupon, CouponError, CouponId},
    discounts::{Discount, DiscountError},
    entries::{CartEntry, EntryError, ItemId, MerchantId},
    persistence::{
        FileStorage, MemoryStorage, NullStorage, PersistedField, PersistedFields,
        PersistenceError, Persistor, RestoreOutcome, Snapshot, SnapshotError, SnapshotStorage,
        StorageError, WritePolicy,
    },
    pricing::PricingError,
    receipt::{ReceiptError, write_receipt},
    session::CartSession,
    store::{CartError, CartStore, Change, MerchantConflict},
};
