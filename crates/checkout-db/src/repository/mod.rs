//! # Repository Module
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Engine service                                                        │
//! │       │                                                                 │
//! │       │  db.gift_cards().consume(user, $20.00, ..)                     │
//! │       ▼                                                                 │
//! │  GiftCardRepository                                                    │
//! │  ├── BEGIN IMMEDIATE                                                   │
//! │  ├── load usable cards, plan debits (checkout-core)                    │
//! │  ├── UPDATE .. WHERE balance_cents >= debit   (guard per card)         │
//! │  ├── INSERT gift_card_redemptions                                      │
//! │  └── COMMIT (or ROLLBACK on any guard miss)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Functions suffixed `_in` take an open connection so a caller can compose
//! several of them inside one transaction (see [`order::OrderRepository::place_order`]).
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog lookups
//! - [`coupon::CouponRepository`] - Coupon catalog and one-time-use markers
//! - [`order::OrderRepository`] - Orders, items, checkout and return records
//! - [`payment::PaymentRepository`] - Payment attempts and refunds
//! - [`gift_card::GiftCardRepository`] - Stored-value ledger
//! - [`loyalty::LoyaltyRepository`] - Points wallet and ledger

pub mod coupon;
pub mod gift_card;
pub mod loyalty;
pub mod order;
pub mod payment;
pub mod product;

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::DbResult;

/// Generates a new row id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Opens a write transaction holding SQLite's write lock from the start.
///
/// A deferred transaction that reads first cannot upgrade once another
/// connection has committed, and fails with `SQLITE_BUSY` instead of
/// reaching the row guards. `BEGIN IMMEDIATE` queues writers on the busy
/// timeout so the loser re-reads committed state and gets `Conflict`.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

#[cfg(test)]
pub(crate) mod test_support {
    use checkout_core::{Money, OrderStatus};

    use super::order::{NewOrder, NewOrderItem};
    use crate::{Database, DbConfig};

    pub async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    /// A file-backed database with several pooled connections, for tests
    /// that race writers. Keep the `TempDir` alive for the test's duration.
    pub async fn file_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("checkout.db")).max_connections(4);
        let db = Database::new(config).await.unwrap();
        (dir, db)
    }

    /// A simple order: one line per `(price, qty)`, no tax or discounts.
    pub fn simple_order(user_id: &str, lines: &[(i64, i64)]) -> NewOrder {
        let items: Vec<NewOrderItem> = lines
            .iter()
            .enumerate()
            .map(|(i, (price, qty))| NewOrderItem {
                product_id: format!("product-{}", i),
                name: format!("Item {}", i),
                quantity: *qty,
                unit_price: Money::from_cents(*price),
            })
            .collect();
        let subtotal: Money = items
            .iter()
            .map(|i| i.unit_price.multiply_quantity(i.quantity))
            .sum();

        NewOrder {
            user_id: user_id.to_string(),
            items,
            subtotal,
            discount: Money::zero(),
            tax: Money::zero(),
            grand_total: subtotal,
            coupon: None,
            loyalty_points: 0,
            loyalty_discount: Money::zero(),
            gift_card_requested: Money::zero(),
            today: chrono::Utc::now().date_naive(),
        }
    }

    /// Places an order and forces it into `status`.
    pub async fn seed_order(db: &Database, user_id: &str, lines: &[(i64, i64)], status: OrderStatus) -> String {
        let order = db
            .orders()
            .place_order(simple_order(user_id, lines))
            .await
            .unwrap();
        db.orders().set_status(&order.id, status).await.unwrap();
        order.id
    }
}
