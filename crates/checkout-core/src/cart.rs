//! # Money Cart
//!
//! The line-item cart of one checkout session.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Storefront Action        Cart Method             State Change          │
//! │  ─────────────────        ───────────             ────────────          │
//! │                                                                         │
//! │  Add product ────────────► add_line() ──────────► merge or push line    │
//! │                                                                         │
//! │  Change quantity ────────► set_quantity() ──────► clamp to [1, 999]     │
//! │                                                                         │
//! │  Remove ─────────────────► remove() ────────────► lines.retain(..)      │
//! │                                                                         │
//! │  Enter code ─────────────► apply_coupon() ──────► coupon = Some(..)     │
//! │                                                                         │
//! │  Drop code ──────────────► remove_coupon() ─────► coupon = None         │
//! │                                                                         │
//! │  NOTE: every mutation ends in recalculate(); totals are never stale.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cart is a plain owned value. The HTTP layer keys one per session and
//! guards it with a mutex; nothing in here is shared or global.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::coupon::check_coupon;
use crate::error::{CoreError, CoreResult, CouponRejection};
use crate::money::Money;
use crate::pricing::{compute_totals, CartTotals};
use crate::types::{Coupon, Product, TaxRate};
use crate::validation::{clamp_quantity, validate_quantity};
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

// =============================================================================
// Cart Line
// =============================================================================

/// One product in the cart.
///
/// Name and unit price are frozen when the line is created, so a catalog
/// price change never moves a cart that is already being checked out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    /// Buying stored value; blocks coupons for the whole cart.
    pub is_gift_card: bool,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartLine {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.price(),
            quantity,
            is_gift_card: product.is_gift_card,
            added_at: Utc::now(),
        }
    }

    /// Unit price × quantity.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding the same product sums quantity)
/// - Every line quantity is within `[1, MAX_LINE_QUANTITY]`
/// - At most `MAX_CART_LINES` lines
/// - No coupon while any gift-card line is present
/// - `totals` always reflects the current lines and coupon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    lines: Vec<CartLine>,
    coupon: Option<Coupon>,
    tax_rate: TaxRate,
    totals: CartTotals,
    created_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    /// Creates an empty cart at the default 8% tax rate.
    pub fn new() -> Self {
        Self::with_tax_rate(TaxRate::default())
    }

    pub fn with_tax_rate(tax_rate: TaxRate) -> Self {
        Cart {
            lines: Vec::new(),
            coupon: None,
            tax_rate,
            totals: CartTotals::default(),
            created_at: Utc::now(),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn coupon(&self) -> Option<&Coupon> {
        self.coupon.as_ref()
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon.as_ref().map(|c| c.code.as_str())
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    /// Current totals. Always up to date; see [`Cart::recalculate`].
    pub fn totals(&self) -> CartTotals {
        self.totals
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines (the storefront's cart badge).
    pub fn item_count(&self) -> i64 {
        self.totals.total_quantity
    }

    pub fn has_gift_card_line(&self) -> bool {
        self.lines.iter().any(|l| l.is_gift_card)
    }

    // -------------------------------------------------------------------------
    // Line Mutations
    // -------------------------------------------------------------------------

    /// Adds `quantity` of a catalog product, merging with an existing line.
    pub fn add_line(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        if !product.is_active {
            return Err(CoreError::ProductUnavailable(product.id.clone()));
        }

        self.add_line_snapshot(
            &product.id,
            &product.name,
            product.price(),
            quantity,
            product.is_gift_card,
        )
    }

    /// Adds a line from already-resolved product data.
    ///
    /// ## Behavior
    /// - Product already in cart: quantities are summed
    /// - Product not in cart: a new line is appended
    ///
    /// Fails without touching the cart if the merged quantity would exceed
    /// `MAX_LINE_QUANTITY` or a new line would exceed `MAX_CART_LINES`.
    pub fn add_line_snapshot(
        &mut self,
        product_id: &str,
        name: &str,
        unit_price: Money,
        quantity: i64,
        is_gift_card: bool,
    ) -> CoreResult<()> {
        validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            let merged = line.quantity + quantity;
            if merged > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: merged,
                    max: MAX_LINE_QUANTITY,
                });
            }
            line.quantity = merged;
        } else {
            if self.lines.len() >= MAX_CART_LINES {
                return Err(CoreError::CartTooLarge {
                    max: MAX_CART_LINES,
                });
            }
            self.lines.push(CartLine {
                product_id: product_id.to_string(),
                name: name.to_string(),
                unit_price,
                quantity,
                is_gift_card,
                added_at: Utc::now(),
            });
        }

        self.recalculate();
        Ok(())
    }

    /// Sets a line's quantity, clamped into `[1, MAX_LINE_QUANTITY]`.
    ///
    /// Use [`Cart::remove`] to take a product out entirely.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::ProductNotInCart(product_id.to_string()))?;

        line.quantity = clamp_quantity(quantity);
        self.recalculate();
        Ok(())
    }

    pub fn remove(&mut self, product_id: &str) -> CoreResult<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);

        if self.lines.len() == before {
            return Err(CoreError::ProductNotInCart(product_id.to_string()));
        }

        self.recalculate();
        Ok(())
    }

    /// Empties the cart after a successful checkout.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.coupon = None;
        self.created_at = Utc::now();
        self.recalculate();
    }

    // -------------------------------------------------------------------------
    // Coupon
    // -------------------------------------------------------------------------

    /// Gift cards are not discountable, so any gift-card line refuses every
    /// coupon. Callers run this before looking the code up.
    pub fn ensure_coupon_allowed(&self) -> Result<(), CouponRejection> {
        if self.has_gift_card_line() {
            return Err(CouponRejection::GiftCardInCart);
        }
        Ok(())
    }

    /// Applies a resolved coupon, replacing any previous one.
    ///
    /// On rejection the cart, including an earlier coupon, is unchanged.
    pub fn apply_coupon(
        &mut self,
        coupon: Coupon,
        today: NaiveDate,
    ) -> Result<CartTotals, CouponRejection> {
        self.ensure_coupon_allowed()?;
        check_coupon(&coupon, self.totals.subtotal, today)?;

        self.coupon = Some(coupon);
        self.recalculate();
        Ok(self.totals)
    }

    /// Removes the coupon. Returns whether one was applied.
    pub fn remove_coupon(&mut self) -> bool {
        let had = self.coupon.take().is_some();
        self.recalculate();
        had
    }

    // -------------------------------------------------------------------------
    // Totals
    // -------------------------------------------------------------------------

    /// Recomputes totals from lines and coupon.
    ///
    /// A coupon that no longer qualifies (a gift-card line was added, or the
    /// subtotal fell below its minimum) is dropped here rather than silently
    /// discounting an ineligible cart.
    pub fn recalculate(&mut self) {
        let subtotal: Money = self.lines.iter().map(CartLine::line_total).sum();

        let still_eligible = self
            .coupon
            .as_ref()
            .map(|c| !self.has_gift_card_line() && subtotal >= c.min_subtotal());
        if still_eligible == Some(false) {
            self.coupon = None;
        }

        self.totals = compute_totals(&self.lines, self.coupon.as_ref(), self.tax_rate);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CouponKind;

    fn product(id: &str, price_cents: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            price_cents,
            is_gift_card: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn gift_card_product() -> Product {
        Product {
            is_gift_card: true,
            ..product("gc-25", 2500)
        }
    }

    fn percent_coupon(bps: i64) -> Coupon {
        Coupon {
            id: "coupon-1".to_string(),
            code: "TENOFF".to_string(),
            kind: CouponKind::Percent,
            value: bps,
            min_subtotal_cents: 0,
            starts_on: None,
            expires_on: None,
            is_active: true,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn scenario_cart() -> Cart {
        let mut cart = Cart::new();
        cart.add_line(&product("a", 1250), 2).unwrap();
        cart.add_line(&product("b", 500), 1).unwrap();
        cart
    }

    #[test]
    fn test_two_lines_with_percent_coupon() {
        let mut cart = scenario_cart();
        assert_eq!(cart.totals().subtotal.cents(), 3000);

        let totals = cart.apply_coupon(percent_coupon(1000), today()).unwrap();

        assert_eq!(totals.discount.cents(), 300);
        assert_eq!(totals.tax.cents(), 216);
        assert_eq!(totals.grand_total.cents(), 2916);
        assert_eq!(cart.coupon_code(), Some("TENOFF"));
    }

    #[test]
    fn test_apply_then_remove_coupon_restores_totals() {
        let mut cart = scenario_cart();
        let before = cart.totals();

        cart.apply_coupon(percent_coupon(1500), today()).unwrap();
        assert_ne!(cart.totals(), before);

        assert!(cart.remove_coupon());
        assert_eq!(cart.totals(), before);
        assert!(!cart.remove_coupon());
    }

    #[test]
    fn test_add_same_product_merges_lines() {
        let mut cart = Cart::new();
        let p = product("1", 999);

        cart.add_line(&p, 2).unwrap();
        cart.add_line(&p, 3).unwrap();

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 5);
        assert_eq!(cart.totals().subtotal.cents(), 4995);
    }

    #[test]
    fn test_merge_beyond_max_quantity_is_rejected() {
        let mut cart = Cart::new();
        let p = product("1", 100);

        cart.add_line(&p, 990).unwrap();
        let err = cart.add_line(&p, 10).unwrap_err();

        assert!(matches!(err, CoreError::QuantityTooLarge { requested: 1000, .. }));
        assert_eq!(cart.item_count(), 990);
    }

    #[test]
    fn test_line_limit() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_LINES {
            cart.add_line(&product(&i.to_string(), 100), 1).unwrap();
        }

        let err = cart.add_line(&product("overflow", 100), 1).unwrap_err();
        assert!(matches!(err, CoreError::CartTooLarge { .. }));
    }

    #[test]
    fn test_inactive_product_rejected() {
        let mut cart = Cart::new();
        let mut p = product("1", 100);
        p.is_active = false;

        assert!(matches!(
            cart.add_line(&p, 1),
            Err(CoreError::ProductUnavailable(_))
        ));
    }

    #[test]
    fn test_set_quantity_clamps() {
        let mut cart = scenario_cart();

        cart.set_quantity("a", 0).unwrap();
        assert_eq!(cart.lines()[0].quantity, 1);

        cart.set_quantity("a", 5000).unwrap();
        assert_eq!(cart.lines()[0].quantity, MAX_LINE_QUANTITY);

        assert!(cart.set_quantity("missing", 2).is_err());
    }

    #[test]
    fn test_remove_line() {
        let mut cart = scenario_cart();

        cart.remove("a").unwrap();
        assert_eq!(cart.totals().subtotal.cents(), 500);
        assert!(matches!(cart.remove("a"), Err(CoreError::ProductNotInCart(_))));
    }

    #[test]
    fn test_gift_card_line_blocks_coupon() {
        let mut cart = scenario_cart();
        cart.add_line(&gift_card_product(), 1).unwrap();

        let before = cart.totals();
        let err = cart.apply_coupon(percent_coupon(1000), today()).unwrap_err();

        assert_eq!(err, CouponRejection::GiftCardInCart);
        assert_eq!(cart.totals(), before);
        assert!(cart.coupon().is_none());
    }

    #[test]
    fn test_adding_gift_card_drops_existing_coupon() {
        let mut cart = scenario_cart();
        cart.apply_coupon(percent_coupon(1000), today()).unwrap();

        cart.add_line(&gift_card_product(), 1).unwrap();

        assert!(cart.coupon().is_none());
        assert!(cart.totals().discount.is_zero());
    }

    #[test]
    fn test_rejected_coupon_leaves_previous_in_place() {
        let mut cart = scenario_cart();
        cart.apply_coupon(percent_coupon(1000), today()).unwrap();
        let before = cart.totals();

        let mut too_big = percent_coupon(2000);
        too_big.code = "BIG".into();
        too_big.min_subtotal_cents = 10_000;

        assert!(matches!(
            cart.apply_coupon(too_big, today()),
            Err(CouponRejection::BelowMinimum { .. })
        ));
        assert_eq!(cart.totals(), before);
        assert_eq!(cart.coupon_code(), Some("TENOFF"));
    }

    #[test]
    fn test_falling_below_minimum_drops_coupon() {
        let mut cart = scenario_cart();
        let mut c = percent_coupon(1000);
        c.min_subtotal_cents = 2500;
        cart.apply_coupon(c, today()).unwrap();

        cart.remove("a").unwrap();

        assert!(cart.coupon().is_none());
        assert_eq!(cart.totals().grand_total.cents(), 540);
    }

    #[test]
    fn test_flat_coupon_never_exceeds_subtotal() {
        let mut cart = Cart::new();
        cart.add_line(&product("cheap", 300), 1).unwrap();

        let flat = Coupon {
            kind: CouponKind::FlatAmount,
            value: 5000,
            ..percent_coupon(0)
        };
        let totals = cart.apply_coupon(flat, today()).unwrap();

        assert_eq!(totals.discount.cents(), 300);
        assert!(totals.tax.is_zero());
        assert!(totals.grand_total.is_zero());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut cart = scenario_cart();
        cart.apply_coupon(percent_coupon(1000), today()).unwrap();

        cart.clear();

        assert!(cart.is_empty());
        assert!(cart.coupon().is_none());
        assert_eq!(cart.totals(), CartTotals::default());
    }
}
