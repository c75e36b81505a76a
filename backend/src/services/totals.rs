//! Invoice totals calculation.
//!
//! Pure decimal arithmetic over validated line items. All monetary results
//! carry two decimal places; the header invariant
//! `total == subtotal - discount + tax_amount` holds exactly for the values
//! returned here.

use crate::error::{ApiError, AppError};
use crate::services::invoicing::ValidatedItem;
use rust_decimal::{Decimal, RoundingStrategy};

/// Derived amounts for one invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceTotals {
    /// Per-item totals (quantity * rate), index-aligned with the input items.
    pub line_totals: Vec<Decimal>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Round a monetary value to cents.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute subtotal, tax, and grand total for a set of line items.
///
/// `tax_rate_percent` is the caller-facing 0..=100 value; `discount` is a flat
/// amount applied before tax. A discount exceeding the subtotal is rejected
/// rather than producing a negative base.
pub fn calculate(
    items: &[ValidatedItem],
    tax_rate_percent: Decimal,
    discount: Decimal,
) -> Result<InvoiceTotals, AppError> {
    let line_totals: Vec<Decimal> = items
        .iter()
        .map(|item| round_money(item.quantity * item.rate))
        .collect();

    let subtotal: Decimal = line_totals.iter().copied().sum();
    let discount_amount = round_money(discount);

    if discount_amount > subtotal {
        return Err(ApiError::validation_single(
            "discount",
            "Discount cannot exceed the invoice subtotal",
        ));
    }

    let taxable_base = subtotal - discount_amount;
    let tax_amount = round_money(taxable_base * tax_rate_percent / Decimal::from(100));
    let total = subtotal - discount_amount + tax_amount;

    Ok(InvoiceTotals {
        line_totals,
        subtotal,
        discount_amount,
        tax_amount,
        total,
    })
}
