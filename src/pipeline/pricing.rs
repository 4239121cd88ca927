//! Pricing engine — numeric coercion and total computation.
//!
//! A pure function of its input: the same priced items always produce the
//! same rows and totals. All arithmetic is exact decimal; binary floats
//! never touch money. Malformed quantities and costs degrade to documented
//! defaults with a warning — garbage input never fails the batch.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::warn;

use crate::pipeline::types::{InvoiceTotals, LineItem, PricedItem};

/// Fixed tax rate — no regional variation in scope.
pub const TAX_RATE: Decimal = dec!(0.16);

/// Fallback when a quantity is absent or unparseable.
pub const DEFAULT_QUANTITY: u32 = 1;

/// Fallback when a unit price is absent or unparseable.
pub const DEFAULT_UNIT_PRICE: Decimal = dec!(1.00);

/// Line totals round to cents, midpoints away from zero.
const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Coerce priced items to numeric rows and compute invoice totals.
///
/// Per line: `line_total = quantity × unit_price`, rounded to 2 decimal
/// places. The subtotal is the exact sum of the rounded line totals; tax
/// and grand total derive from it unrounded (display rounding happens at
/// the presentation boundary).
pub fn price_items(items: &[PricedItem]) -> (Vec<LineItem>, InvoiceTotals) {
    let rows: Vec<LineItem> = items.iter().map(price_line).collect();

    let subtotal: Decimal = rows.iter().map(|r| r.line_total).sum();
    let tax = subtotal * TAX_RATE;
    let totals = InvoiceTotals {
        subtotal,
        tax_rate: TAX_RATE,
        tax,
        grand_total: subtotal + tax,
    };

    (rows, totals)
}

fn price_line(item: &PricedItem) -> LineItem {
    let quantity = coerce_quantity(item.quantity.as_deref(), &item.name);
    let unit_price = coerce_price(item.unit_price.as_deref(), &item.name);
    let line_total =
        (Decimal::from(quantity) * unit_price).round_dp_with_strategy(2, ROUNDING);

    LineItem {
        name: item.name.clone(),
        quantity,
        unit_price,
        line_total,
    }
}

fn coerce_quantity(raw: Option<&str>, name: &str) -> u32 {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s.parse().unwrap_or_else(|_| {
            warn!(item = %name, quantity = %s, "Unparseable quantity — defaulting to 1");
            DEFAULT_QUANTITY
        }),
        _ => {
            warn!(item = %name, "Missing quantity — defaulting to 1");
            DEFAULT_QUANTITY
        }
    }
}

fn coerce_price(raw: Option<&str>, name: &str) -> Decimal {
    match raw.map(clean_money) {
        Some(s) if !s.is_empty() => s.parse().unwrap_or_else(|_| {
            warn!(item = %name, price = %s, "Unparseable unit price — defaulting to 1.00");
            DEFAULT_UNIT_PRICE
        }),
        _ => {
            warn!(item = %name, "Missing unit price — defaulting to 1.00");
            DEFAULT_UNIT_PRICE
        }
    }
}

/// Strip presentation noise from a money string: currency symbol,
/// thousands separators, whitespace.
fn clean_money(raw: &str) -> String {
    raw.trim().trim_start_matches('$').replace(',', "")
}
