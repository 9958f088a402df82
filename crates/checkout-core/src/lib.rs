//! # checkout-core: Pure Money Logic for the Storefront Checkout
//!
//! This crate is the **heart** of the checkout engine. It contains all money
//! rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Storefront Checkout Architecture                    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    checkout-api (axum)                          │   │
//! │  │   /cart/coupon  /payment/{provider}/start  /orders/{id}/return  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        checkout-engine (providers, refunds, orchestration)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ checkout-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  money  │ │  cart   │ │ coupon  │ │ loyalty │ │ returns │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │   ┌─────────┐ ┌───────────┐ ┌──────────┐                        │   │
//! │  │   │ pricing │ │ gift_card │ │validation│                        │   │
//! │  │   └─────────┘ └───────────┘ └──────────┘                        │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 checkout-db (SQLite repositories)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output, including "now" which is
//!    always passed in
//! 2. **Integer Money**: all monetary values are cents (i64)
//! 3. **Clamp, don't detect**: discounts and refunds are bounded at the
//!    point they are computed, so invariants hold by construction
//!
//! ## Example Usage
//!
//! ```rust
//! use checkout_core::cart::Cart;
//! use checkout_core::Money;
//!
//! let mut cart = Cart::new();
//! cart.add_line_snapshot("mug", "Mug", Money::from_cents(1250), 2, false).unwrap();
//! cart.add_line_snapshot("tea", "Tea", Money::from_cents(500), 1, false).unwrap();
//!
//! let totals = cart.totals();
//! assert_eq!(totals.subtotal.cents(), 3000);
//! assert_eq!(totals.tax.cents(), 240);
//! assert_eq!(totals.grand_total.cents(), 3240);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod coupon;
pub mod error;
pub mod gift_card;
pub mod loyalty;
pub mod money;
pub mod pricing;
pub mod returns;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{
    CoreError, CoreResult, CouponRejection, LoyaltyError, ReturnRejection, ValidationError,
};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Flat sales tax applied to (subtotal − discount): 8%.
pub const DEFAULT_TAX_BPS: u32 = 800;

/// Maximum distinct lines in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Settlement currency. Multi-currency is out of scope.
pub const CURRENCY: &str = "USD";
