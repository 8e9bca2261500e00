//! Integration tests for the cart store operations.
//!
//! The walkthrough test follows one user's cart from empty through adding, re-adding and
//! zeroing the same item:
//!
//! 1. Add Tea (id 1, 2.50, qty 2, merchant 9) -> one entry, qty 2, version 1
//! 2. Add Tea again with qty 3 -> one entry, qty 5, version 2
//! 3. Set Tea's quantity to 0 -> no entries, version 3

use jiff::Timestamp;
use rust_decimal::Decimal;
use testresult::TestResult;

use cart_store::prelude::*;

fn store() -> CartStore<ManualClock> {
    CartStore::with_clock(ManualClock::new(Timestamp::UNIX_EPOCH))
}

fn tea(quantity: u32) -> CartEntry {
    CartEntry::new(ItemId(1), "Tea", Decimal::new(25, 1), quantity, MerchantId(9))
}

fn item(id: u64, merchant: u64, quantity: u32) -> CartEntry {
    CartEntry::new(
        ItemId(id),
        format!("Item {id}"),
        Decimal::new(150, 2),
        quantity,
        MerchantId(merchant),
    )
}

#[test]
fn test_tea_walkthrough() -> TestResult {
    let mut store = store();
    let u1 = UserId::new("u1");

    assert_eq!(store.add_item(&u1, tea(2))?, Change::Applied);

    let cart = store.cart("u1").ok_or("cart missing after first add")?;

    assert_eq!(cart.items(), &[tea(2)]);
    assert_eq!(cart.version(), 1);

    assert_eq!(store.add_item(&u1, tea(3))?, Change::Applied);

    let cart = store.cart("u1").ok_or("cart missing after second add")?;

    assert_eq!(cart.len(), 1);
    assert_eq!(cart.get(ItemId(1)).map(|entry| entry.quantity), Some(5));
    assert_eq!(cart.version(), 2);

    assert_eq!(store.update_item_quantity(&u1, ItemId(1), 0), Change::Applied);

    let cart = store.cart("u1").ok_or("cart missing after update")?;

    assert!(cart.is_empty());
    assert_eq!(cart.version(), 3);

    Ok(())
}

#[test]
fn test_repeated_add_sums_quantities_and_bumps_version_twice() -> TestResult {
    for (first, second) in [(1, 1), (2, 7), (10, 90)] {
        let mut store = store();
        let user = UserId::new("u1");

        assert!(store.add_item(&user, item(4, 1, first))?.is_applied());
        assert!(store.add_item(&user, item(4, 1, second))?.is_applied());

        let cart = store.cart("u1").ok_or("cart missing")?;

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get(ItemId(4)).map(|e| e.quantity), Some(first + second));
        assert_eq!(cart.version(), 2);
    }

    Ok(())
}

#[test]
fn test_zero_quantity_add_is_rejected_without_side_effects() -> TestResult {
    let mut store = store();
    let user = UserId::new("u1");

    assert!(store.add_item(&user, tea(1))?.is_applied());

    let before = store.state().clone();

    let result = store.add_item(&user, item(2, 9, 0));

    assert_eq!(
        result,
        Err(CartError::InvalidEntry(EntryError::ZeroQuantity))
    );
    assert_eq!(store.state(), &before);
    assert_eq!(store.version("u1"), 1);

    Ok(())
}

#[test]
fn test_rejected_add_does_not_create_a_cart() {
    let mut store = store();
    let user = UserId::new("u2");

    let mut entry = item(2, 9, 1);
    entry.price = Decimal::new(-5, 0);

    assert!(store.add_item(&user, entry).is_err());
    assert!(store.cart("u2").is_none());
}

#[test]
fn test_remove_unknown_item_is_a_noop() -> TestResult {
    let mut store = store();
    let user = UserId::new("u1");

    assert!(store.add_item(&user, tea(1))?.is_applied());

    let before = store.state().clone();

    assert_eq!(store.remove_item(&user, ItemId(99)), Change::Unchanged);
    assert_eq!(store.remove_item(&UserId::new("nobody"), ItemId(1)), Change::Unchanged);
    assert_eq!(store.state(), &before);

    Ok(())
}

#[test]
fn test_clear_cart_only_touches_one_user() -> TestResult {
    let mut store = store();
    let u1 = UserId::new("u1");
    let u2 = UserId::new("u2");

    assert!(store.add_item(&u1, tea(1))?.is_applied());
    assert!(store.add_item(&u2, item(5, 2, 3))?.is_applied());

    let other_before = store.cart("u2").cloned();

    assert_eq!(store.clear_cart(&u1), Change::Applied);

    assert!(store.items("u1").is_empty());
    assert_eq!(store.version("u1"), 2);
    assert_eq!(store.cart("u2").cloned(), other_before);

    Ok(())
}

#[test]
fn test_clear_all_resets_everything() -> TestResult {
    let mut store = store();
    let user = UserId::new("u1");

    assert!(store.add_item(&user, tea(1))?.is_applied());
    assert!(store.set_current_user(Some(user)).is_applied());

    assert_eq!(store.clear_all(), Change::Applied);
    assert!(store.state().is_empty());
    assert_eq!(store.clear_all(), Change::Unchanged);

    Ok(())
}

#[test]
fn test_state_round_trips_through_json() -> TestResult {
    let mut store = store();
    let u1 = UserId::new("u1");

    let latte = CartEntry::new(ItemId(3), "Latte", Decimal::new(405, 2), 1, MerchantId(9))
        .with_discount(Discount::Percentage(Decimal::new(10, 0)))
        .with_image("https://cdn.example/latte.png")
        .with_option("milk", "oat");

    assert!(store.add_item(&u1, tea(2))?.is_applied());
    assert!(store.add_item(&u1, latte)?.is_applied());
    assert!(store.add_item(&UserId::guest(), item(8, 4, 1))?.is_applied());
    assert!(store.set_current_user(Some(u1)).is_applied());

    let json = serde_json::to_string(store.state())?;
    let decoded: CartState = serde_json::from_str(&json)?;

    assert_eq!(&decoded, store.state());

    Ok(())
}

#[test]
fn test_merchant_conflict_policies() -> TestResult {
    let mut store = store();
    let user = UserId::new("u1");

    assert!(store.add_item(&user, tea(1))?.is_applied());

    let rejected =
        store.add_item_with_merchant_check(&user, item(2, 4, 1), MerchantConflict::Reject);

    assert_eq!(
        rejected,
        Err(CartError::MerchantConflict {
            existing: MerchantId(9),
            incoming: MerchantId(4),
        })
    );
    assert_eq!(store.version("u1"), 1);

    let replaced =
        store.add_item_with_merchant_check(&user, item(2, 4, 1), MerchantConflict::Replace)?;

    assert_eq!(replaced, Change::Applied);
    assert_eq!(store.items("u1"), &[item(2, 4, 1)]);

    Ok(())
}

#[test]
fn test_login_merges_guest_cart() -> TestResult {
    let mut store = store();
    let guest = UserId::guest();
    let user = UserId::new("u1");

    assert!(store.add_item(&guest, tea(1))?.is_applied());
    assert!(store.add_item(&user, tea(2))?.is_applied());

    assert_eq!(store.login(user.clone())?, Change::Applied);

    assert_eq!(store.active_user(), &user);
    assert!(store.cart(GUEST_USER).is_none());
    assert_eq!(store.active_items(), &[tea(3)]);

    assert_eq!(store.logout(), Change::Applied);
    assert_eq!(store.active_user(), &guest);
    assert_eq!(store.items("u1"), &[tea(3)]);

    Ok(())
}

#[test]
fn test_coupon_dropped_below_minimum() -> TestResult {
    let mut store = store();
    let user = UserId::new("u1");

    assert!(store.add_item(&user, tea(4))?.is_applied());

    let coupon = AppliedCoupon::new(
        CouponId(1),
        "TEN",
        Discount::Percentage(Decimal::TEN),
        Decimal::new(8, 0),
    );

    assert!(store.apply_coupon(&user, coupon)?.is_applied());
    assert_eq!(store.summary("u1")?.total, Decimal::new(9, 0));

    assert!(store.update_item_quantity(&user, ItemId(1), 2).is_applied());

    assert!(store.cart("u1").and_then(UserCart::applied_coupon).is_none());
    assert_eq!(store.summary("u1")?.total, Decimal::new(5, 0));

    Ok(())
}
