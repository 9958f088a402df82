//! # Domain Types
//!
//! Core domain types used throughout the checkout engine.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │    Payment      │   │     Refund      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  status         │◄──│  order_id (FK)  │◄──│  payment_id     │       │
//! │  │  grand_total    │   │  provider       │   │  amount         │       │
//! │  │  refund_total   │   │  status         │   │  status         │       │
//! │  └────────┬────────┘   └─────────────────┘   └─────────────────┘       │
//! │           │ 1..n                                                        │
//! │  ┌────────▼────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   OrderItem     │   │    GiftCard     │   │  LoyaltyWallet  │       │
//! │  │  returned       │   │  balance        │   │  points         │       │
//! │  │  return_request │   │  redemptions ─► │   │  ledger ─►      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Monetary columns are stored as `*_cents: i64` and exposed as [`Money`]
//! through accessor methods, so rows map one-to-one onto database tables.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 800 bps = 8%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::from_bps(crate::DEFAULT_TAX_BPS)
    }
}

// =============================================================================
// Session Principal
// =============================================================================

/// The authenticated caller of a request.
///
/// Authentication itself happens upstream; by the time a request reaches
/// the checkout engine the principal is this one typed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Stable user identifier (ownership checks).
    pub user_id: String,
    /// Checkout session identifier (cart key).
    pub session_id: String,
}

// =============================================================================
// Product (catalog collaborator)
// =============================================================================

/// A sellable product as the catalog reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    /// Purchasing this product buys stored value; it is never discountable.
    pub is_gift_card: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Coupons
// =============================================================================

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponKind {
    /// `value` is basis points of the subtotal (1000 = 10%).
    Percent,
    /// `value` is cents off the subtotal.
    FlatAmount,
}

/// A discount rule identified by a code.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Coupon {
    pub id: String,
    /// Stored upper-case; lookups normalize the same way.
    pub code: String,
    pub kind: CouponKind,
    pub value: i64,
    pub min_subtotal_cents: i64,
    #[ts(as = "Option<String>")]
    pub starts_on: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub expires_on: Option<NaiveDate>,
    pub is_active: bool,
}

impl Coupon {
    #[inline]
    pub fn min_subtotal(&self) -> Money {
        Money::from_cents(self.min_subtotal_cents)
    }
}

/// One-time-use marker: a (user, coupon, order) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CouponRedemption {
    pub id: String,
    pub user_id: String,
    pub coupon_id: String,
    pub order_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Gift Cards
// =============================================================================

/// A stored-value card.
///
/// ## Balance Invariant
/// `original_cents == balance_cents + Σ redemption.amount_cents` at all
/// times; top-ups raise both sides together.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct GiftCard {
    pub id: String,
    pub code: String,
    pub original_cents: i64,
    pub balance_cents: i64,
    /// `None` until the first claimant redeems the code.
    pub owner_user_id: Option<String>,
    pub is_active: bool,
    #[ts(as = "Option<String>")]
    pub expires_on: Option<NaiveDate>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl GiftCard {
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    /// A card is usable iff active, unexpired on `today`, and holding value.
    pub fn is_usable(&self, today: NaiveDate) -> bool {
        self.is_active
            && self.balance_cents > 0
            && self.expires_on.map_or(true, |expiry| today <= expiry)
    }
}

/// Append-only debit record for a gift card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct GiftCardRedemption {
    pub id: String,
    pub gift_card_id: String,
    pub order_id: Option<String>,
    pub amount_cents: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Loyalty
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyWallet {
    pub user_id: String,
    pub points: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyEntryKind {
    Earn,
    Redeem,
}

/// Append-only loyalty ledger row. REDEEM rows carry negative points so the
/// wallet balance is the plain sum of `points`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LoyaltyEntry {
    pub id: String,
    pub user_id: String,
    pub order_id: Option<String>,
    pub kind: LoyaltyEntryKind,
    pub points: i64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Orders
// =============================================================================

/// Order lifecycle.
///
/// ```text
/// Pending ──► Paid ──► Shipped ──► Delivered
///               │         │            │
///               └─────────┴────────────┴──► ReturnRequested ──► Returned
///                                                  │
///                                                  └──► Delivered (partial)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    ReturnRequested,
    Returned,
    Cancelled,
}

impl OrderStatus {
    /// Storage/wire spelling, matching the sqlx encoding.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::ReturnRequested => "return_requested",
            OrderStatus::Returned => "returned",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A placed order.
///
/// `subtotal_cents` is the pre-discount, pre-tax line sum. The money actually
/// owed is `grand_total_cents` less loyalty and gift-card cover, which is
/// `amount_due_cents`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub grand_total_cents: i64,
    pub gift_card_cents: i64,
    pub loyalty_discount_cents: i64,
    pub amount_due_cents: i64,
    pub refund_total_cents: i64,
    pub coupon_code: Option<String>,
    /// Legacy rows may lack a creation timestamp.
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<OrderItem>,
}

impl Order {
    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }

    #[inline]
    pub fn refund_total(&self) -> Money {
        Money::from_cents(self.refund_total_cents)
    }

    #[inline]
    pub fn amount_due(&self) -> Money {
        Money::from_cents(self.amount_due_cents)
    }

    /// What can still be credited back before the accumulator hits the
    /// grand total.
    #[inline]
    pub fn refundable_remaining(&self) -> Money {
        self.grand_total().saturating_sub_floor(self.refund_total())
    }
}

/// A purchased line on an order.
///
/// The line total is never stored independently: it is always
/// `unit_price × quantity`, computed on read.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub returned: bool,
    pub return_requested: bool,
    pub return_status: Option<String>,
}

impl OrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Payments
// =============================================================================

/// External payment rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    /// Card-network rail (PaymentIntent-style API).
    Stripe,
    /// Alternative-wallet rail (order/capture-style API).
    Paypal,
    /// Cash on delivery. No provider interaction at all.
    Cod,
}

impl PaymentProvider {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Paypal => "paypal",
            PaymentProvider::Cod => "cod",
        }
    }

    /// Whether funds are captured online (and can therefore be refunded
    /// through the provider).
    pub const fn is_online(&self) -> bool {
        !matches!(self, PaymentProvider::Cod)
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentProvider {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(PaymentProvider::Stripe),
            "paypal" => Ok(PaymentProvider::Paypal),
            "cod" => Ok(PaymentProvider::Cod),
            _ => Err(crate::error::ValidationError::NotAllowed {
                field: "provider".to_string(),
                allowed: vec!["stripe".into(), "paypal".into(), "cod".into()],
            }),
        }
    }
}

/// Payment state machine.
///
/// ```text
/// Initiated ──► Succeeded ──► RefundInitiated ──► Refunded
///     │                              │
///     └──► Failed                    └──► RefundFailed
///
/// Pending (COD only) ──► Succeeded (manual reconciliation)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Initiated,
    Pending,
    Succeeded,
    Failed,
    RefundInitiated,
    Refunded,
    RefundFailed,
}

impl PaymentStatus {
    /// Funds were captured at some point (refund states included).
    pub const fn is_captured(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Succeeded
                | PaymentStatus::RefundInitiated
                | PaymentStatus::Refunded
                | PaymentStatus::RefundFailed
        )
    }

    /// The charge attempt itself has concluded.
    pub const fn is_terminal_charge(&self) -> bool {
        !matches!(self, PaymentStatus::Initiated | PaymentStatus::Pending)
    }
}

/// One charge attempt against one provider.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider: PaymentProvider,
    /// Provider's handle for the charge session (intent id, order id).
    pub provider_charge_id: Option<String>,
    /// Provider's id of the captured transaction; refunds are keyed by it.
    pub provider_transaction_id: Option<String>,
    pub refund_external_id: Option<String>,
    pub refund_reason: Option<String>,
    pub refunded: bool,
    #[ts(as = "Option<String>")]
    pub refunded_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Initiated,
    Completed,
    Failed,
}

/// A reversal of part or all of a charge.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Refund {
    pub id: String,
    pub payment_id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub status: RefundStatus,
    pub provider_refund_id: Option<String>,
    pub reason: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Refund {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
