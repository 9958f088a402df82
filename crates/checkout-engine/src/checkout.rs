//! # Checkout Service
//!
//! Cart operations that need a collaborator (catalog, coupon catalog,
//! wallets), the checkout quote, and order placement.
//!
//! ```text
//!   cart ──add_item──► catalog lookup ──► Cart::add_line
//!   cart ──apply_coupon──► gift-card guard ──► normalize ──► lookup by code
//!                          ──► one-time-use check ──► Cart::apply_coupon
//!                              (active, date window, minimum subtotal)
//!   cart ──place_order──► quote ──► OrderRepository::place_order (one tx)
//!                                     ──► cart cleared, shopper notified
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use checkout_core::cart::Cart;
use checkout_core::loyalty::LoyaltyProgram;
use checkout_core::pricing::{CartTotals, CheckoutQuote};
use checkout_core::validation::normalize_code;
use checkout_core::{
    CoreError, CouponRejection, GiftCard, LoyaltyWallet, Money, Order, TaxRate, ValidationError,
};
use checkout_db::{ClaimOutcome, Database, DbError, NewOrder, NewOrderItem};

use crate::error::{EngineError, EngineResult};
use crate::notify::{Notifier, Template};

/// Shopper choices at checkout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOptions {
    #[serde(default)]
    pub use_gift_cards: bool,
    /// Points to redeem; 0 for none.
    #[serde(default)]
    pub loyalty_points: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order: Order,
    pub quote: CheckoutQuote,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Database,
    notifier: Arc<dyn Notifier>,
    tax_rate: TaxRate,
    loyalty: LoyaltyProgram,
}

impl CheckoutService {
    pub fn new(
        db: Database,
        notifier: Arc<dyn Notifier>,
        tax_rate: TaxRate,
        loyalty: LoyaltyProgram,
    ) -> Self {
        CheckoutService {
            db,
            notifier,
            tax_rate,
            loyalty,
        }
    }

    /// A fresh cart at the configured tax rate.
    pub fn new_cart(&self) -> Cart {
        Cart::with_tax_rate(self.tax_rate)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    pub async fn add_item(&self, cart: &mut Cart, product_id: &str, quantity: i64) -> EngineResult<CartTotals> {
        let product = self
            .db
            .products()
            .find_product(product_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Product", product_id))?;

        cart.add_line(&product, quantity)?;
        Ok(cart.totals())
    }

    /// Looks the code up and applies it. A rejection leaves the cart as it
    /// was, including any earlier coupon.
    #[instrument(skip(self, cart))]
    pub async fn apply_coupon(
        &self,
        cart: &mut Cart,
        user_id: &str,
        code: &str,
        today: NaiveDate,
    ) -> EngineResult<CartTotals> {
        cart.ensure_coupon_allowed()?;

        let code = match normalize_code("code", code) {
            Ok(code) => code,
            Err(ValidationError::Required { .. }) => return Err(CouponRejection::EmptyCode.into()),
            Err(e) => return Err(e.into()),
        };

        let coupon = self
            .db
            .coupons()
            .find_by_code(&code)
            .await?
            .ok_or(CouponRejection::UnknownCode)?;

        if self.db.coupons().has_redeemed(user_id, &coupon.id).await? {
            return Err(CouponRejection::AlreadyUsed.into());
        }

        let totals = cart.apply_coupon(coupon, today)?;
        info!(code = %code, discount = %totals.discount, "Coupon applied");
        Ok(totals)
    }

    pub fn remove_coupon(&self, cart: &mut Cart) -> CartTotals {
        cart.remove_coupon();
        cart.totals()
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// What placing the order right now would charge.
    pub async fn quote(
        &self,
        cart: &Cart,
        user_id: &str,
        options: CheckoutOptions,
        today: NaiveDate,
    ) -> EngineResult<CheckoutQuote> {
        let totals = cart.totals();

        let loyalty_discount = if options.loyalty_points > 0 {
            let balance = self.db.loyalty().balance(user_id).await?;
            self.loyalty
                .validate_order_redemption(options.loyalty_points, balance, totals.grand_total)?;
            self.loyalty.discount_for(options.loyalty_points)
        } else {
            Money::zero()
        };

        let gift_card_available = if options.use_gift_cards {
            self.db.gift_cards().usable_balance(user_id, today).await?
        } else {
            Money::zero()
        };

        Ok(CheckoutQuote::compute(
            totals,
            options.loyalty_points,
            loyalty_discount,
            gift_card_available,
        ))
    }

    /// Persists the cart as an order and clears it.
    ///
    /// On any error the cart is untouched and nothing was written.
    #[instrument(skip(self, cart))]
    pub async fn place_order(
        &self,
        cart: &mut Cart,
        user_id: &str,
        options: CheckoutOptions,
        today: NaiveDate,
    ) -> EngineResult<PlacedOrder> {
        if cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        if let Some(coupon) = cart.coupon() {
            if self.db.coupons().has_redeemed(user_id, &coupon.id).await? {
                return Err(CouponRejection::AlreadyUsed.into());
            }
        }

        let quote = self.quote(cart, user_id, options, today).await?;
        let totals = quote.totals;

        let new_order = NewOrder {
            user_id: user_id.to_string(),
            items: cart
                .lines()
                .iter()
                .map(|line| NewOrderItem {
                    product_id: line.product_id.clone(),
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            subtotal: totals.subtotal,
            discount: totals.discount,
            tax: totals.tax,
            grand_total: totals.grand_total,
            coupon: cart.coupon().cloned(),
            loyalty_points: quote.loyalty_points,
            loyalty_discount: quote.loyalty_discount,
            gift_card_requested: quote.gift_card_applied,
            today,
        };

        let order = match self.db.orders().place_order(new_order).await {
            Ok(order) => order,
            Err(DbError::UniqueViolation { .. }) => return Err(CouponRejection::AlreadyUsed.into()),
            // points or card balance were spent between quote and commit
            Err(DbError::Conflict { .. }) => {
                return Err(EngineError::Rejected(
                    "Your points or gift card balance changed during checkout. Please try again.".into(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        cart.clear();

        self.notifier.notify(
            user_id,
            Template::OrderPlaced,
            json!({
                "orderId": order.id,
                "grandTotal": order.grand_total().to_decimal_string(),
                "amountDue": order.amount_due().to_decimal_string(),
            }),
        );

        let quote = CheckoutQuote {
            gift_card_applied: Money::from_cents(order.gift_card_cents),
            amount_due: order.amount_due(),
            ..quote
        };
        Ok(PlacedOrder { order, quote })
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Claims a gift card code for the shopper.
    #[instrument(skip(self))]
    pub async fn redeem_gift_card(&self, user_id: &str, code: &str) -> EngineResult<GiftCard> {
        let code = normalize_code("code", code)?;

        match self.db.gift_cards().redeem_to_user(user_id, &code).await {
            Ok(ClaimOutcome::Claimed(card)) | Ok(ClaimOutcome::AlreadyOwned(card)) => Ok(card),
            Ok(ClaimOutcome::OwnedByAnother) => Err(EngineError::Forbidden(
                "This gift card has already been redeemed by another account".into(),
            )),
            Err(e) if e.is_not_found() => Err(EngineError::not_found("Gift card", &code)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn gift_cards(&self, user_id: &str) -> EngineResult<Vec<GiftCard>> {
        Ok(self.db.gift_cards().list_for_user(user_id).await?)
    }

    pub async fn loyalty_wallet(&self, user_id: &str) -> EngineResult<LoyaltyWallet> {
        Ok(self.db.loyalty().wallet(user_id).await?)
    }
}
