//! # Order Repository
//!
//! Orders, their items, and the two multi-row units of work that touch them:
//! placing an order and recording a return.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. PLACE (one transaction)                                            │
//! │     └── INSERT order + items                                           │
//! │     └── redeem loyalty points      (REDEEM ledger row)                 │
//! │     └── consume gift-card balance  (redemption rows)                   │
//! │     └── INSERT coupon_redemptions  (one-time-use marker)               │
//! │     └── status = PAID if nothing is due, else PENDING                  │
//! │                                                                         │
//! │  2. PAY  (payment repository)                                          │
//! │     └── PENDING ──► PAID                                               │
//! │                                                                         │
//! │  3. FULFIL (administrative)                                            │
//! │     └── PAID ──► SHIPPED ──► DELIVERED                                 │
//! │                                                                         │
//! │  4. RETURN (one transaction, guarded on status)                        │
//! │     └── {PAID, SHIPPED, DELIVERED} ──► RETURN_REQUESTED                │
//! │     └── refund_total += amount,  items.return_requested = 1            │
//! │                                                                         │
//! │  5. COMPLETE RETURN (administrative)                                   │
//! │     └── RETURN_REQUESTED ──► RETURNED | DELIVERED (partial)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::coupon::record_redemption_in;
use super::gift_card::consume_in;
use super::loyalty::redeem_in;
use super::{begin_write, new_id};
use crate::error::{DbError, DbResult};
use checkout_core::{Coupon, Money, Order, OrderItem, OrderStatus};

const ORDER_COLUMNS: &str = r#"
    id, user_id, status,
    subtotal_cents, discount_cents, tax_cents, grand_total_cents,
    gift_card_cents, loyalty_discount_cents, amount_due_cents,
    refund_total_cents, coupon_code, created_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, order_id, product_id, name, quantity, unit_price_cents,
    returned, return_requested, return_status
"#;

/// Item status strings shown to the shopper.
pub const RETURN_STATUS_REQUESTED: &str = "REQUESTED";
pub const RETURN_STATUS_RETURNED: &str = "RETURNED";

// =============================================================================
// Inputs
// =============================================================================

/// A line to persist; the line total is derived, never stored.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Everything checkout needs to persist an order in one go.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: String,
    pub items: Vec<NewOrderItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub grand_total: Money,
    /// Recorded as a one-time-use redemption.
    pub coupon: Option<Coupon>,
    /// Points to redeem (already validated against the program rules).
    pub loyalty_points: i64,
    pub loyalty_discount: Money,
    /// Gift-card cover to attempt; the ledger may cover less.
    pub gift_card_requested: Money,
    /// Gift-card usability is judged against this date.
    pub today: NaiveDate,
}

/// A committed return request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRecord {
    pub order_id: String,
    pub item_ids: Vec<String>,
    pub amount: Money,
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order with its items.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = ?1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match order {
            Some(mut order) => {
                order.items = self.get_items(&order.id).await?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY position",
            ITEM_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// A user's orders, newest first, without items.
    pub async fn list_for_user(&self, user_id: &str) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Persists an order and applies every stored-value movement it implies.
    ///
    /// Any failure (a gift card drained by a concurrent checkout, points
    /// spent elsewhere, a coupon already used) rolls the whole order back.
    pub async fn place_order(&self, new: NewOrder) -> DbResult<Order> {
        let id = new_id();
        let now = Utc::now();

        let loyalty_discount = if new.loyalty_points > 0 {
            new.loyalty_discount.min(new.grand_total)
        } else {
            Money::zero()
        };
        let after_loyalty = new.grand_total.saturating_sub_floor(loyalty_discount);

        let mut tx = begin_write(&self.pool).await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, status,
                subtotal_cents, discount_cents, tax_cents, grand_total_cents,
                gift_card_cents, loyalty_discount_cents, amount_due_cents,
                refund_total_cents, coupon_code, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, 0, ?10, ?11, ?11)
            "#,
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(OrderStatus::Pending)
        .bind(new.subtotal.cents())
        .bind(new.discount.cents())
        .bind(new.tax.cents())
        .bind(new.grand_total.cents())
        .bind(loyalty_discount.cents())
        .bind(after_loyalty.cents())
        .bind(new.coupon.as_ref().map(|c| c.code.clone()))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (position, item) in new.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, name, quantity, unit_price_cents,
                    returned, return_requested, return_status, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, NULL, ?7)
                "#,
            )
            .bind(new_id())
            .bind(&id)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price.cents())
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        if !loyalty_discount.is_zero() {
            redeem_in(
                &mut *tx,
                &new.user_id,
                Some(&id),
                new.loyalty_points,
                "Redeemed at checkout",
            )
            .await?;
        }

        let gift_card_covered = consume_in(
            &mut *tx,
            &new.user_id,
            new.gift_card_requested.min(after_loyalty),
            "Applied at checkout",
            Some(&id),
            new.today,
        )
        .await?;

        let amount_due = after_loyalty.saturating_sub_floor(gift_card_covered);
        let status = if amount_due.is_zero() {
            OrderStatus::Paid
        } else {
            OrderStatus::Pending
        };

        sqlx::query(
            r#"
            UPDATE orders SET gift_card_cents = ?1, amount_due_cents = ?2, status = ?3
            WHERE id = ?4
            "#,
        )
        .bind(gift_card_covered.cents())
        .bind(amount_due.cents())
        .bind(status)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        if let Some(coupon) = &new.coupon {
            record_redemption_in(&mut *tx, &new.user_id, &coupon.id, &id).await?;
        }

        tx.commit().await?;

        info!(
            order_id = %id,
            user_id = %new.user_id,
            grand_total = %new.grand_total,
            gift_card = %gift_card_covered,
            loyalty = %loyalty_discount,
            amount_due = %amount_due,
            status = %status,
            "Order placed"
        );

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", &id))
    }

    /// Sets the status unconditionally (fulfilment and admin tooling).
    pub async fn set_status(&self, order_id: &str, status: OrderStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status)
            .bind(Utc::now())
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        debug!(order_id = %order_id, status = %status, "Order status set");
        Ok(())
    }

    /// Commits a return request.
    ///
    /// The status guard serializes concurrent requests on the same order:
    /// the second writer matches no row and gets `Conflict`, so the refund
    /// accumulator can only move once.
    pub async fn record_return(
        &self,
        order_id: &str,
        item_ids: &[String],
        amount: Money,
    ) -> DbResult<ReturnRecord> {
        let mut tx = begin_write(&self.pool).await?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'return_requested',
                refund_total_cents = refund_total_cents + ?1,
                updated_at = ?2
            WHERE id = ?3
              AND status IN ('paid', 'shipped', 'delivered')
              AND refund_total_cents + ?1 <= grand_total_cents
            "#,
        )
        .bind(amount.cents())
        .bind(Utc::now())
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Order", order_id, "no longer returnable"));
        }

        for item_id in item_ids {
            mark_item_requested_in(&mut *tx, order_id, item_id).await?;
        }

        tx.commit().await?;

        info!(order_id = %order_id, items = item_ids.len(), amount = %amount, "Return recorded");

        Ok(ReturnRecord {
            order_id: order_id.to_string(),
            item_ids: item_ids.to_vec(),
            amount,
        })
    }

    /// Marks requested items as returned and settles the order status:
    /// RETURNED when nothing is left, DELIVERED otherwise.
    pub async fn complete_return(&self, order_id: &str) -> DbResult<OrderStatus> {
        let mut tx = begin_write(&self.pool).await?;

        sqlx::query(
            r#"
            UPDATE order_items SET returned = 1, return_requested = 0, return_status = ?1
            WHERE order_id = ?2 AND return_requested = 1
            "#,
        )
        .bind(RETURN_STATUS_RETURNED)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        let open: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE order_id = ?1 AND returned = 0")
                .bind(order_id)
                .fetch_one(&mut *tx)
                .await?;

        let status = if open == 0 {
            OrderStatus::Returned
        } else {
            OrderStatus::Delivered
        };

        let result = sqlx::query(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'return_requested'",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Order", order_id, "no return in progress"));
        }

        tx.commit().await?;

        info!(order_id = %order_id, status = %status, "Return completed");
        Ok(status)
    }
}

async fn mark_item_requested_in(
    conn: &mut SqliteConnection,
    order_id: &str,
    item_id: &str,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE order_items SET return_requested = 1, return_status = ?1
        WHERE id = ?2 AND order_id = ?3 AND returned = 0 AND return_requested = 0
        "#,
    )
    .bind(RETURN_STATUS_REQUESTED)
    .bind(item_id)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("Order item", item_id, "already returned or pending"));
    }

    Ok(())
}

/// Marks a PENDING order PAID. Returns whether the row moved.
pub(crate) async fn mark_paid_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE orders SET status = 'paid', updated_at = ?1 WHERE id = ?2 AND status = 'pending'",
    )
    .bind(Utc::now())
    .bind(order_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::test_support::{file_db, seed_order, simple_order, test_db};
    use super::*;

    #[tokio::test]
    async fn test_place_order_persists_items_in_order() {
        let db = test_db().await;

        let order = db
            .orders()
            .place_order(simple_order("alice", &[(1250, 2), (500, 1)]))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.grand_total_cents, 3000);
        assert_eq!(order.amount_due_cents, 3000);
        assert!(order.created_at.is_some());
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].line_total().cents(), 2500);
        assert_eq!(order.items[1].line_total().cents(), 500);
    }

    #[tokio::test]
    async fn test_place_order_fully_covered_by_gift_card_is_paid() {
        let db = test_db().await;
        db.gift_cards().issue("BIG", Money::from_cents(10_000), None).await.unwrap();
        db.gift_cards().redeem_to_user("alice", "BIG").await.unwrap();

        let mut new = simple_order("alice", &[(3000, 1)]);
        new.gift_card_requested = Money::from_cents(10_000);
        let order = db.orders().place_order(new).await.unwrap();

        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.gift_card_cents, 3000);
        assert_eq!(order.amount_due_cents, 0);

        let card = db.gift_cards().get_by_code("BIG").await.unwrap().unwrap();
        assert_eq!(card.balance_cents, 7000);
    }

    #[tokio::test]
    async fn test_place_order_rolls_back_on_insufficient_points() {
        let db = test_db().await;

        let mut new = simple_order("alice", &[(3000, 1)]);
        new.loyalty_points = 50;
        new.loyalty_discount = Money::from_cents(100);

        assert!(db.orders().place_order(new).await.is_err());
        assert!(db.orders().list_for_user("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_return_is_guarded_by_status() {
        let db = test_db().await;
        let order_id = seed_order(&db, "alice", &[(1000, 1), (3000, 1)], OrderStatus::Delivered).await;
        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        let ids: Vec<String> = order.items.iter().map(|i| i.id.clone()).collect();

        db.orders()
            .record_return(&order_id, &ids, Money::from_cents(4000))
            .await
            .unwrap();

        let err = db
            .orders()
            .record_return(&order_id, &ids, Money::from_cents(4000))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::ReturnRequested);
        assert_eq!(order.refund_total_cents, 4000);
        assert!(order.items.iter().all(|i| i.return_requested));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_return_requests_count_once() {
        let (_dir, db) = file_db().await;
        let order_id = seed_order(&db, "alice", &[(1000, 1), (3000, 1)], OrderStatus::Delivered).await;
        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        let ids: Vec<String> = order.items.iter().map(|i| i.id.clone()).collect();

        let first = db.orders();
        let second = db.orders();
        let (a, b) = tokio::join!(
            first.record_return(&order_id, &ids, Money::from_cents(4000)),
            second.record_return(&order_id, &ids, Money::from_cents(4000)),
        );

        let (won, lost): (Vec<_>, Vec<_>) = [a, b].into_iter().partition(|r| r.is_ok());
        assert_eq!(won.len(), 1);
        assert_eq!(lost.len(), 1);
        for result in lost {
            assert!(matches!(result.unwrap_err(), DbError::Conflict { .. }));
        }

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::ReturnRequested);
        assert_eq!(order.refund_total_cents, 4000);
        assert!(order.items.iter().all(|i| i.return_requested));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_checkouts_share_one_gift_card_balance() {
        let (_dir, db) = file_db().await;
        db.gift_cards().issue("SHARED", Money::from_cents(2000), None).await.unwrap();
        db.gift_cards().redeem_to_user("alice", "SHARED").await.unwrap();

        let mut first_order = simple_order("alice", &[(1500, 1)]);
        first_order.gift_card_requested = Money::from_cents(2000);
        let mut second_order = simple_order("alice", &[(1500, 1)]);
        second_order.gift_card_requested = Money::from_cents(2000);

        let first = db.orders();
        let second = db.orders();
        let (a, b) = tokio::join!(first.place_order(first_order), second.place_order(second_order));
        let (a, b) = (a.unwrap(), b.unwrap());

        let mut applied = vec![a.gift_card_cents, b.gift_card_cents];
        applied.sort();
        assert_eq!(applied, vec![500, 1500]);
        assert_eq!(a.amount_due_cents + b.amount_due_cents, 1000);

        let card = db.gift_cards().get_by_code("SHARED").await.unwrap().unwrap();
        let redeemed: i64 = db
            .gift_cards()
            .redemptions(&card.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.amount_cents)
            .sum();
        assert_eq!(card.balance_cents, 0);
        assert_eq!(card.original_cents, card.balance_cents + redeemed);
    }

    #[tokio::test]
    async fn test_record_return_never_exceeds_grand_total() {
        let db = test_db().await;
        let order_id = seed_order(&db, "alice", &[(1000, 1)], OrderStatus::Paid).await;

        let err = db
            .orders()
            .record_return(&order_id, &[], Money::from_cents(1001))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_complete_partial_return_goes_back_to_delivered() {
        let db = test_db().await;
        let order_id = seed_order(&db, "alice", &[(1000, 1), (3000, 1)], OrderStatus::Delivered).await;
        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        let first = order.items[0].id.clone();

        db.orders()
            .record_return(&order_id, &[first.clone()], Money::from_cents(1000))
            .await
            .unwrap();
        assert_eq!(
            db.orders().complete_return(&order_id).await.unwrap(),
            OrderStatus::Delivered
        );

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert!(order.items[0].returned);
        assert_eq!(order.items[0].return_status.as_deref(), Some(RETURN_STATUS_RETURNED));
        assert!(!order.items[1].returned);

        let second = order.items[1].id.clone();
        db.orders()
            .record_return(&order_id, &[second], Money::from_cents(3000))
            .await
            .unwrap();
        assert_eq!(
            db.orders().complete_return(&order_id).await.unwrap(),
            OrderStatus::Returned
        );
    }
}
