use cart_store::{
    carts::UserId,
    coupons::{AppliedCoupon, CouponId},
    discounts::Discount,
    store::Change,
};
use clap::{Args, Subcommand};
use rust_decimal::Decimal;

use super::Session;

#[derive(Debug, Args)]
pub(crate) struct CouponCommand {
    #[command(subcommand)]
    command: CouponSubcommand,
}

#[derive(Debug, Subcommand)]
enum CouponSubcommand {
    /// Apply a coupon, replacing any current one
    Apply(ApplyCouponArgs),
    /// Remove the applied coupon
    Remove,
}

#[derive(Debug, Args)]
struct ApplyCouponArgs {
    /// Coupon id
    #[arg(long)]
    id: u64,

    /// Coupon code
    #[arg(long)]
    code: String,

    /// Percentage off the subtotal
    #[arg(long, conflicts_with = "amount", required_unless_present = "amount")]
    percent: Option<Decimal>,

    /// Fixed amount off the subtotal
    #[arg(long)]
    amount: Option<Decimal>,

    /// Minimum subtotal for the coupon to apply
    #[arg(long, default_value = "0")]
    min_order: Decimal,
}

pub(crate) fn run(
    session: &mut Session,
    user: &UserId,
    command: CouponCommand,
) -> Result<Change, String> {
    match command.command {
        CouponSubcommand::Apply(args) => {
            let discount = args
                .percent
                .map(Discount::Percentage)
                .or(args.amount.map(Discount::Fixed))
                .unwrap_or_default();

            let coupon = AppliedCoupon::new(CouponId(args.id), args.code, discount, args.min_order);

            session
                .apply(|store| store.apply_coupon(user, coupon))
                .map_err(|error| format!("failed to apply coupon: {error}"))
        }
        CouponSubcommand::Remove => session
            .apply(|store| Ok(store.remove_coupon(user)))
            .map_err(|error| format!("failed to remove coupon: {error}")),
    }
}
