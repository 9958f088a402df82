//! # Pricing
//!
//! Turns cart lines plus an optional coupon into totals, and cart totals plus
//! loyalty and gift-card cover into the amount actually charged.
//!
//! ## Calculation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lines ──► subtotal = Σ unit_price × qty                                │
//! │                │                                                        │
//! │   coupon ──► discount = min(rule(subtotal), subtotal)                   │
//! │                │                                                        │
//! │                ▼                                                        │
//! │         taxable = subtotal − discount                                   │
//! │         tax     = round_half_up(taxable × 8%)                           │
//! │         grand   = taxable + tax                                         │
//! │                │                                                        │
//! │   loyalty ───► loyalty_discount = min(points value, grand)              │
//! │   gift cards ► gift_card_applied = min(usable balance, remainder)       │
//! │                │                                                        │
//! │                ▼                                                        │
//! │         amount_due = grand − loyalty_discount − gift_card_applied ≥ 0   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::CartLine;
use crate::coupon::coupon_discount;
use crate::money::Money;
use crate::types::{Coupon, TaxRate};

/// Totals reported for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub grand_total: Money,
    /// Number of distinct lines.
    pub line_count: usize,
    pub total_quantity: i64,
}

/// Computes cart totals.
///
/// Line totals are exact in cents, so rounding "at each line and at the sum"
/// reduces to the single half-up rounding of the tax.
pub fn compute_totals(lines: &[CartLine], coupon: Option<&Coupon>, tax_rate: TaxRate) -> CartTotals {
    let subtotal: Money = lines.iter().map(CartLine::line_total).sum();

    let discount = coupon
        .map(|c| coupon_discount(c, subtotal))
        .unwrap_or_default();

    let taxable = subtotal.saturating_sub_floor(discount);
    let tax = taxable.calculate_tax(tax_rate);

    CartTotals {
        subtotal,
        discount,
        tax,
        grand_total: taxable + tax,
        line_count: lines.len(),
        total_quantity: lines.iter().map(|l| l.quantity).sum(),
    }
}

/// What the shopper pays once stored value and points are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CheckoutQuote {
    pub totals: CartTotals,
    pub loyalty_points: i64,
    pub loyalty_discount: Money,
    pub gift_card_applied: Money,
    pub amount_due: Money,
}

impl CheckoutQuote {
    /// Applies loyalty first, then gift-card balance, each clamped to what is
    /// still owed.
    ///
    /// ```rust
    /// use checkout_core::pricing::{CartTotals, CheckoutQuote};
    /// use checkout_core::Money;
    ///
    /// let totals = CartTotals { grand_total: Money::from_cents(2916), ..Default::default() };
    /// let quote = CheckoutQuote::compute(totals, 100, Money::from_cents(200), Money::from_cents(5000));
    /// assert_eq!(quote.gift_card_applied.cents(), 2716);
    /// assert!(quote.amount_due.is_zero());
    /// ```
    pub fn compute(
        totals: CartTotals,
        loyalty_points: i64,
        loyalty_discount: Money,
        gift_card_available: Money,
    ) -> Self {
        let loyalty_discount = loyalty_discount.min(totals.grand_total).max(Money::zero());
        let after_loyalty = totals.grand_total.saturating_sub_floor(loyalty_discount);

        let gift_card_applied = gift_card_available.min(after_loyalty).max(Money::zero());
        let amount_due = after_loyalty.saturating_sub_floor(gift_card_applied);

        CheckoutQuote {
            totals,
            loyalty_points: if loyalty_discount.is_zero() { 0 } else { loyalty_points },
            loyalty_discount,
            gift_card_applied,
            amount_due,
        }
    }
}
