//! Receipt

use std::io;

use rusty_money::iso::Currency;
use tabled::{
    builder::Builder,
    settings::{
        Alignment, Color, Style,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::{
    carts::UserCart,
    entries::CartEntry,
    pricing::{self, PricingError},
};

/// Errors that can occur when rendering a receipt.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// Totals could not be computed.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Render a cart as a table followed by its totals.
///
/// # Errors
///
/// Returns a [`ReceiptError`] if totals overflow or writing fails.
pub fn write_receipt(
    out: &mut impl io::Write,
    cart: &UserCart,
    currency: &'static Currency,
) -> Result<(), ReceiptError> {
    if cart.is_empty() {
        writeln!(out, "Cart is empty")?;

        return Ok(());
    }

    let mut builder = Builder::default();

    builder.push_record(["Item", "Qty", "Unit Price", "Was", "Line Total"]);

    for entry in cart.items() {
        builder.push_record(entry_row(entry, currency)?);
    }

    let mut table = builder.build();

    table.with(Style::modern_rounded());
    table.modify(Rows::first(), Color::BOLD);
    table.modify(Columns::new(1..5), Alignment::right());

    writeln!(out, "{table}")?;

    write_summary(out, cart, currency)
}

fn entry_row(entry: &CartEntry, currency: &'static Currency) -> Result<[String; 5], ReceiptError> {
    let line_total = entry
        .line_total()
        .ok_or(PricingError::LineOverflow(entry.id))?;

    let was = match entry.discount.original_unit_price(entry.price) {
        Some(original) if !entry.discount.is_none() => {
            pricing::to_money(original, currency)?.to_string()
        }
        _ => String::new(),
    };

    Ok([
        entry.name.clone(),
        entry.quantity.to_string(),
        pricing::to_money(entry.price, currency)?.to_string(),
        was,
        pricing::to_money(line_total, currency)?.to_string(),
    ])
}

fn write_summary(
    out: &mut impl io::Write,
    cart: &UserCart,
    currency: &'static Currency,
) -> Result<(), ReceiptError> {
    let summary = cart.summary()?;

    let mut lines = vec![
        ("Items:", summary.total_items.to_string()),
        ("Subtotal:", pricing::to_money(summary.subtotal, currency)?.to_string()),
    ];

    if let Some(coupon) = cart.applied_coupon() {
        lines.push((
            "Coupon:",
            format!(
                "-{} ({})",
                pricing::to_money(summary.coupon_discount, currency)?,
                coupon.code
            ),
        ));
    }

    lines.push(("Total:", pricing::to_money(summary.total, currency)?.to_string()));

    let label_width = lines.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let value_width = lines.iter().map(|(_, value)| value.len()).max().unwrap_or(0);

    for (label, value) in lines {
        writeln!(out, " {label:>label_width$}  {value:>value_width$}")?;
    }

    Ok(())
}
