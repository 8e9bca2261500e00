//! Cart Store
//!
//! Client-side shopping cart state for a multi-merchant storefront: one cart per user,
//! mutated through a single store, versioned per cart and persisted as a JSON snapshot.

pub mod carts;
pub mod clock;
pub mod config;
pub mod coupons;
pub mod discounts;
pub mod entries;
pub mod persistence;
pub mod prelude;
pub mod pricing;
pub mod receipt;
pub mod session;
pub mod store;
