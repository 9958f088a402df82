//! # Return Service
//!
//! Commits a return request, then tries to move the money back.
//!
//! ## Return Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. load order + items ──► plan (core rules)        rejected? ──► Err   │
//! │  2. record_return: status guard + accumulator       lost race? ──► Err  │
//! │  ────────────────────── return is committed from here on ─────────────  │
//! │  3. latest successful online charge (with one resync)                   │
//! │        none ──► NoOnlinePayment                                         │
//! │  4. create_refund (clamped to the charge)           zero ──► Nothing    │
//! │  5. gateway.refund(transaction id, amount)                              │
//! │        ok  ──► refund COMPLETED ──► RefundCompleted                     │
//! │        err ──► refund FAILED, payment REFUND_FAILED ──► RefundFailed    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps 3 to 5 never undo step 2. A failed refund leaves the order in
//! RETURN_REQUESTED and the payment flagged for manual follow-up.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use checkout_core::returns::{plan_full_return, plan_item_return, ReturnPlan, ReturnPolicy};
use checkout_core::{Money, Order, OrderStatus, Payment, ReturnRejection};
use checkout_db::{Database, DbError};

use crate::error::{EngineError, EngineResult};
use crate::gateway::GatewayRegistry;
use crate::notify::{Notifier, Template};
use crate::payment::PaymentService;

// =============================================================================
// Outcome
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    Completed,
    Failed,
    /// No captured online charge (COD, or never paid online).
    NoOnlinePayment,
    /// The charge was already fully refunded.
    NothingToRefund,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnOutcome {
    pub order_id: String,
    pub item_ids: Vec<String>,
    /// Value of the returned items, credited to the order's refund
    /// accumulator.
    pub credited: Money,
    /// Sent back through the payment provider. Less than `credited` when
    /// part of the order was covered by gift cards or points, or when no
    /// online refund went through.
    pub refunded: Money,
    pub refund: RefundState,
    pub refund_id: Option<String>,
    pub message: String,
}

impl ReturnOutcome {
    /// Whether the shopper can consider the matter settled.
    pub fn is_success(&self) -> bool {
        !matches!(self.refund, RefundState::Failed)
    }
}

struct Settlement {
    state: RefundState,
    refunded: Money,
    refund_id: Option<String>,
}

impl Settlement {
    fn unrefunded(state: RefundState, refund_id: Option<String>) -> Self {
        Settlement {
            state,
            refunded: Money::zero(),
            refund_id,
        }
    }
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct ReturnService {
    db: Database,
    payments: PaymentService,
    gateways: GatewayRegistry,
    notifier: Arc<dyn Notifier>,
    policy: ReturnPolicy,
}

impl ReturnService {
    pub fn new(
        db: Database,
        payments: PaymentService,
        notifier: Arc<dyn Notifier>,
        policy: ReturnPolicy,
    ) -> Self {
        let gateways = payments.gateways().clone();
        ReturnService {
            db,
            payments,
            gateways,
            notifier,
            policy,
        }
    }

    /// `POST /orders/{id}/return`: every item not yet returned.
    #[instrument(skip(self))]
    pub async fn request_return(&self, order_id: &str, user_id: &str) -> EngineResult<ReturnOutcome> {
        let order = self.load(order_id).await?;
        let plan = plan_full_return(&order, user_id, Utc::now(), &self.policy)?;
        self.execute(&order, plan, "Order returned").await
    }

    /// `POST /orders/{id}/returnItem/{itemId}`.
    #[instrument(skip(self))]
    pub async fn request_item_return(
        &self,
        order_id: &str,
        item_id: &str,
        user_id: &str,
    ) -> EngineResult<ReturnOutcome> {
        let order = self.load(order_id).await?;
        let plan = plan_item_return(&order, item_id, user_id, Utc::now(), &self.policy)?;
        self.execute(&order, plan, "Item returned").await
    }

    /// Goods received back: requested items become returned.
    #[instrument(skip(self))]
    pub async fn complete_return(&self, order_id: &str) -> EngineResult<OrderStatus> {
        match self.db.orders().complete_return(order_id).await {
            Ok(status) => Ok(status),
            Err(DbError::Conflict { .. }) => Err(EngineError::InvalidState(
                "No return is in progress for this order".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, order_id: &str) -> EngineResult<Order> {
        self.db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))
    }

    async fn execute(&self, order: &Order, plan: ReturnPlan, reason: &str) -> EngineResult<ReturnOutcome> {
        let record = match self
            .db
            .orders()
            .record_return(&order.id, &plan.item_ids, plan.amount)
            .await
        {
            Ok(record) => record,
            // Another request got there first.
            Err(DbError::Conflict { .. }) => return Err(ReturnRejection::AlreadyRequested.into()),
            Err(e) => return Err(e.into()),
        };

        self.notifier.notify(
            &order.user_id,
            Template::ReturnRequested,
            json!({ "orderId": order.id, "amount": record.amount.to_decimal_string() }),
        );

        let settlement = match self.refund(order, record.amount, reason).await {
            Ok(settlement) => settlement,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Refund bookkeeping failed after return was recorded");
                Settlement::unrefunded(RefundState::Failed, None)
            }
        };

        if settlement.refunded < record.amount {
            info!(
                order_id = %order.id,
                credited = %record.amount,
                refunded = %settlement.refunded,
                "Return credited more than was refunded online"
            );
        }

        Ok(ReturnOutcome {
            order_id: order.id.clone(),
            item_ids: record.item_ids,
            credited: record.amount,
            refunded: settlement.refunded,
            refund: settlement.state,
            refund_id: settlement.refund_id,
            message: message_for(settlement.state).to_string(),
        })
    }

    async fn refund(
        &self,
        order: &Order,
        amount: Money,
        reason: &str,
    ) -> EngineResult<Settlement> {
        let Some(charge) = self.payments.latest_successful_charge(&order.id).await? else {
            info!(order_id = %order.id, "No online payment to refund");
            return Ok(Settlement::unrefunded(RefundState::NoOnlinePayment, None));
        };

        let Some(refund) = self
            .db
            .payments()
            .create_refund(&charge.id, amount, reason)
            .await?
        else {
            return Ok(Settlement::unrefunded(RefundState::NothingToRefund, None));
        };

        match self.dispatch(&charge, refund.amount(), reason).await {
            Ok(provider_refund_id) => {
                self.db
                    .payments()
                    .complete_refund(&refund.id, &provider_refund_id)
                    .await?;
                self.notifier.notify(
                    &order.user_id,
                    Template::RefundCompleted,
                    json!({ "orderId": order.id, "amount": refund.amount().to_decimal_string() }),
                );
                Ok(Settlement {
                    state: RefundState::Completed,
                    refunded: refund.amount(),
                    refund_id: Some(refund.id),
                })
            }
            Err(failure) => {
                warn!(order_id = %order.id, refund_id = %refund.id, reason = %failure, "Refund failed");
                self.db.payments().fail_refund(&refund.id, &failure).await?;
                self.notifier.notify(
                    &order.user_id,
                    Template::RefundFailed,
                    json!({ "orderId": order.id }),
                );
                Ok(Settlement::unrefunded(RefundState::Failed, Some(refund.id)))
            }
        }
    }

    /// Calls the owning provider. `Err` carries the reason recorded on the
    /// failed refund.
    async fn dispatch(&self, charge: &Payment, amount: Money, reason: &str) -> Result<String, String> {
        let gateway = self.gateways.get(charge.provider).map_err(|e| e.to_string())?;

        let transaction_id = charge
            .provider_transaction_id
            .as_deref()
            .or(charge.provider_charge_id.as_deref())
            .ok_or_else(|| "charge has no provider transaction id".to_string())?;

        let receipt = gateway
            .refund(transaction_id, amount, reason)
            .await
            .map_err(|e| e.to_string())?;

        if receipt.refund_id.trim().is_empty() {
            return Err("provider returned no refund id".to_string());
        }
        Ok(receipt.refund_id)
    }
}

fn message_for(state: RefundState) -> &'static str {
    match state {
        RefundState::Completed => "Return requested. Your refund has been issued.",
        RefundState::Failed => {
            "Return requested. We could not issue your refund automatically and will follow up."
        }
        RefundState::NoOnlinePayment => "Return requested, no online payment to refund.",
        RefundState::NothingToRefund => "Return requested. This order has already been fully refunded.",
    }
}
