//! # Return Eligibility and Refund Amounts
//!
//! ## Order Return State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   PAID ─────┐                                                           │
//! │   SHIPPED ──┼──► request_return ──► RETURN_REQUESTED ──► RETURNED       │
//! │   DELIVERED ┘         │                    │                            │
//! │                       │                    └──► DELIVERED (partial)     │
//! │                       ▼                                                 │
//! │   refund_total += amount  (clamped to grand_total − refund_total)       │
//! │                                                                         │
//! │   Any other status, a foreign user, or a closed window ──► rejected     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Eligibility is decided on `status` alone, so a second request against an
//! already-requested order is rejected no matter how close together the two
//! requests arrive.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReturnRejection;
use crate::money::Money;
use crate::types::{Order, OrderItem, OrderStatus};

/// Return window and related knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnPolicy {
    pub window_days: i64,
}

impl Default for ReturnPolicy {
    fn default() -> Self {
        ReturnPolicy { window_days: 30 }
    }
}

/// What a return request will do once committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnPlan {
    /// Items that become `return_requested`.
    pub item_ids: Vec<String>,
    /// Σ line totals of those items.
    pub gross: Money,
    /// Amount credited to the order accumulator and refunded.
    pub amount: Money,
}

/// Statuses from which a return may be requested.
pub const RETURNABLE_STATUSES: [OrderStatus; 3] =
    [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered];

/// Order-level eligibility shared by full and single-item returns.
pub fn check_order_returnable(
    order: &Order,
    user_id: &str,
    now: DateTime<Utc>,
    policy: &ReturnPolicy,
) -> Result<(), ReturnRejection> {
    if order.user_id != user_id {
        return Err(ReturnRejection::NotOwner);
    }

    match order.status {
        OrderStatus::ReturnRequested => return Err(ReturnRejection::AlreadyRequested),
        OrderStatus::Returned => return Err(ReturnRejection::AlreadyReturned),
        status if !RETURNABLE_STATUSES.contains(&status) => {
            return Err(ReturnRejection::IneligibleStatus { status })
        }
        _ => {}
    }

    // Legacy orders without a timestamp are let through.
    if let Some(created_at) = order.created_at {
        if now - created_at > Duration::days(policy.window_days) {
            return Err(ReturnRejection::WindowElapsed {
                days: policy.window_days,
            });
        }
    }

    Ok(())
}

/// Plans a whole-order return: every item not yet returned or pending.
pub fn plan_full_return(
    order: &Order,
    user_id: &str,
    now: DateTime<Utc>,
    policy: &ReturnPolicy,
) -> Result<ReturnPlan, ReturnRejection> {
    check_order_returnable(order, user_id, now, policy)?;

    let open: Vec<&OrderItem> = order
        .items
        .iter()
        .filter(|i| !i.returned && !i.return_requested)
        .collect();

    if open.is_empty() {
        return Err(ReturnRejection::NothingToReturn);
    }

    let gross: Money = open.iter().map(|i| i.line_total()).sum();
    let amount = gross.min(order.refundable_remaining());

    Ok(ReturnPlan {
        item_ids: open.iter().map(|i| i.id.clone()).collect(),
        gross,
        amount,
    })
}

/// Plans a single-item return.
pub fn plan_item_return(
    order: &Order,
    item_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
    policy: &ReturnPolicy,
) -> Result<ReturnPlan, ReturnRejection> {
    check_order_returnable(order, user_id, now, policy)?;

    let item = order
        .items
        .iter()
        .find(|i| i.id == item_id)
        .ok_or(ReturnRejection::ItemNotFound)?;

    if item.returned {
        return Err(ReturnRejection::ItemAlreadyReturned);
    }
    if item.return_requested {
        return Err(ReturnRejection::ItemReturnPending);
    }

    let gross = item.line_total();
    if !gross.is_positive() {
        return Err(ReturnRejection::ZeroValueItem);
    }

    Ok(ReturnPlan {
        item_ids: vec![item.id.clone()],
        gross,
        amount: gross.min(order.refundable_remaining()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, price: i64, qty: i64, returned: bool) -> OrderItem {
        OrderItem {
            id: id.to_string(),
            order_id: "order-1".to_string(),
            product_id: format!("p-{}", id),
            name: id.to_string(),
            quantity: qty,
            unit_price_cents: price,
            returned,
            return_requested: false,
            return_status: returned.then(|| "RETURNED".to_string()),
        }
    }

    fn order(status: OrderStatus, items: Vec<OrderItem>) -> Order {
        let subtotal: i64 = items.iter().map(|i| i.line_total().cents()).sum();
        Order {
            id: "order-1".to_string(),
            user_id: "alice".to_string(),
            status,
            subtotal_cents: subtotal,
            discount_cents: 0,
            tax_cents: 0,
            grand_total_cents: subtotal,
            gift_card_cents: 0,
            loyalty_discount_cents: 0,
            amount_due_cents: subtotal,
            refund_total_cents: 0,
            coupon_code: None,
            created_at: Some(Utc::now() - Duration::days(3)),
            updated_at: Utc::now(),
            items,
        }
    }

    #[test]
    fn test_full_return_skips_returned_items() {
        let mut o = order(
            OrderStatus::Delivered,
            vec![
                item("a", 1000, 1, true),
                item("b", 1500, 1, false),
                item("c", 750, 2, false),
            ],
        );
        o.refund_total_cents = 1000;

        let plan = plan_full_return(&o, "alice", Utc::now(), &ReturnPolicy::default()).unwrap();

        assert_eq!(plan.amount.cents(), 3000);
        assert_eq!(plan.item_ids, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_full_return_clamped_to_refundable_remaining() {
        let mut o = order(OrderStatus::Paid, vec![item("a", 4000, 1, false)]);
        // coupon brought the charge below the line sum
        o.grand_total_cents = 3240;

        let plan = plan_full_return(&o, "alice", Utc::now(), &ReturnPolicy::default()).unwrap();

        assert_eq!(plan.gross.cents(), 4000);
        assert_eq!(plan.amount.cents(), 3240);
    }

    #[test]
    fn test_only_paid_shipped_delivered_are_returnable() {
        let policy = ReturnPolicy::default();
        for status in [
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            OrderStatus::ReturnRequested,
            OrderStatus::Returned,
        ] {
            let o = order(status, vec![item("a", 100, 1, false)]);
            assert!(plan_full_return(&o, "alice", Utc::now(), &policy).is_err());
        }
        for status in RETURNABLE_STATUSES {
            let o = order(status, vec![item("a", 100, 1, false)]);
            assert!(plan_full_return(&o, "alice", Utc::now(), &policy).is_ok());
        }
    }

    #[test]
    fn test_repeat_request_rejected_by_status() {
        let o = order(OrderStatus::ReturnRequested, vec![item("a", 100, 1, false)]);
        assert_eq!(
            plan_full_return(&o, "alice", Utc::now(), &ReturnPolicy::default()),
            Err(ReturnRejection::AlreadyRequested)
        );
    }

    #[test]
    fn test_foreign_user_rejected() {
        let o = order(OrderStatus::Paid, vec![item("a", 100, 1, false)]);
        assert_eq!(
            check_order_returnable(&o, "mallory", Utc::now(), &ReturnPolicy::default()),
            Err(ReturnRejection::NotOwner)
        );
    }

    #[test]
    fn test_window() {
        let policy = ReturnPolicy::default();
        let mut o = order(OrderStatus::Delivered, vec![item("a", 100, 1, false)]);

        o.created_at = Some(Utc::now() - Duration::days(31));
        assert_eq!(
            check_order_returnable(&o, "alice", Utc::now(), &policy),
            Err(ReturnRejection::WindowElapsed { days: 30 })
        );

        o.created_at = None;
        assert!(check_order_returnable(&o, "alice", Utc::now(), &policy).is_ok());
    }

    #[test]
    fn test_item_return_rules() {
        let policy = ReturnPolicy::default();
        let mut pending = item("p", 500, 1, false);
        pending.return_requested = true;

        let o = order(
            OrderStatus::Shipped,
            vec![
                item("done", 500, 1, true),
                pending,
                item("free", 0, 1, false),
                item("ok", 1250, 2, false),
            ],
        );
        let now = Utc::now();

        assert_eq!(
            plan_item_return(&o, "done", "alice", now, &policy),
            Err(ReturnRejection::ItemAlreadyReturned)
        );
        assert_eq!(
            plan_item_return(&o, "p", "alice", now, &policy),
            Err(ReturnRejection::ItemReturnPending)
        );
        assert_eq!(
            plan_item_return(&o, "free", "alice", now, &policy),
            Err(ReturnRejection::ZeroValueItem)
        );
        assert_eq!(
            plan_item_return(&o, "ghost", "alice", now, &policy),
            Err(ReturnRejection::ItemNotFound)
        );

        let plan = plan_item_return(&o, "ok", "alice", now, &policy).unwrap();
        assert_eq!(plan.amount.cents(), 2500);
    }
}
