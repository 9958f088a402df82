//! # checkout-db: Database Layer for the Storefront Checkout
//!
//! SQLite persistence with sqlx. Every multi-row money movement (placing an
//! order, debiting gift cards, redeeming points, recording a return, creating
//! a refund) is one transaction here, guarded by conditional updates.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Checkout Data Flow                               │
//! │                                                                         │
//! │  checkout-engine (CheckoutService, PaymentService, ReturnService)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  checkout-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ OrderRepo      │    │ 001_initial  │  │   │
//! │  │   │ SqlitePool    │◄───│ PaymentRepo    │    │  _schema.sql │  │   │
//! │  │   │               │    │ GiftCardRepo   │    │              │  │   │
//! │  │   │               │    │ LoyaltyRepo .. │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("checkout.db")).await?;
//! let order = db.orders().get_by_id(&order_id).await?;
//! let covered = db.gift_cards().consume(&user_id, amount, "order", None, today).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::coupon::CouponRepository;
pub use repository::gift_card::{ClaimOutcome, GiftCardRepository};
pub use repository::loyalty::LoyaltyRepository;
pub use repository::order::{NewOrder, NewOrderItem, OrderRepository, ReturnRecord};
pub use repository::payment::PaymentRepository;
pub use repository::product::ProductRepository;
