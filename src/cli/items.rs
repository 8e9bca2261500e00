use cart_store::{
    carts::UserId,
    discounts::Discount,
    entries::{CartEntry, ItemId, MerchantId},
    store::{Change, MerchantConflict},
};
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use super::Session;

#[derive(Debug, Args)]
pub(crate) struct AddArgs {
    /// Item id
    #[arg(long)]
    id: u64,

    /// Display name
    #[arg(long)]
    name: String,

    /// Unit price as charged
    #[arg(long)]
    price: Decimal,

    /// Number of units
    #[arg(long, default_value_t = 1)]
    quantity: u32,

    /// Merchant selling the item
    #[arg(long)]
    merchant: u64,

    /// Percentage the charged price is below the original
    #[arg(long, conflicts_with = "discount_amount")]
    discount_percent: Option<Decimal>,

    /// Amount per unit the charged price is below the original
    #[arg(long)]
    discount_amount: Option<Decimal>,

    /// Image URL
    #[arg(long)]
    image: Option<String>,

    /// Item option as KEY=VALUE; VALUE is read as JSON when it parses
    #[arg(long = "option", value_parser = parse_option)]
    options: Vec<(String, Value)>,

    /// Keep the cart to one merchant, replacing or rejecting on conflict
    #[arg(long, value_enum)]
    merchant_check: Option<MerchantCheck>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MerchantCheck {
    Replace,
    Reject,
}

#[derive(Debug, Args)]
pub(crate) struct UpdateArgs {
    /// Item id
    #[arg(long)]
    id: u64,

    /// New quantity; zero removes the item
    #[arg(long)]
    quantity: u32,
}

#[derive(Debug, Args)]
pub(crate) struct ItemArgs {
    /// Item id
    #[arg(long)]
    id: u64,
}

pub(crate) fn add(session: &mut Session, user: &UserId, args: AddArgs) -> Result<Change, String> {
    let discount = match (args.discount_percent, args.discount_amount) {
        (Some(percent), _) => Discount::Percentage(percent),
        (None, Some(amount)) => Discount::Fixed(amount),
        (None, None) => Discount::None,
    };

    let mut entry = CartEntry::new(
        ItemId(args.id),
        args.name,
        args.price,
        args.quantity,
        MerchantId(args.merchant),
    )
    .with_discount(discount);

    if let Some(image) = args.image {
        entry = entry.with_image(image);
    }

    for (key, value) in args.options {
        entry = entry.with_option(key, value);
    }

    let result = match args.merchant_check {
        None => session.apply(|store| store.add_item(user, entry)),
        Some(check) => {
            let on_conflict = match check {
                MerchantCheck::Replace => MerchantConflict::Replace,
                MerchantCheck::Reject => MerchantConflict::Reject,
            };

            session.apply(|store| store.add_item_with_merchant_check(user, entry, on_conflict))
        }
    };

    result.map_err(|error| format!("failed to add item: {error}"))
}

pub(crate) fn update(
    session: &mut Session,
    user: &UserId,
    args: &UpdateArgs,
) -> Result<Change, String> {
    session
        .apply(|store| Ok(store.update_item_quantity(user, ItemId(args.id), args.quantity)))
        .map_err(|error| format!("failed to update item: {error}"))
}

pub(crate) fn remove(
    session: &mut Session,
    user: &UserId,
    args: &ItemArgs,
) -> Result<Change, String> {
    session
        .apply(|store| Ok(store.remove_item(user, ItemId(args.id))))
        .map_err(|error| format!("failed to remove item: {error}"))
}

pub(crate) fn decrease(
    session: &mut Session,
    user: &UserId,
    args: &ItemArgs,
) -> Result<Change, String> {
    session
        .apply(|store| Ok(store.decrease_item_quantity(user, ItemId(args.id))))
        .map_err(|error| format!("failed to decrease item: {error}"))
}

fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;

    if key.trim().is_empty() {
        return Err(format!("option key cannot be empty in {raw:?}"));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));

    Ok((key.trim().to_string(), value))
}
