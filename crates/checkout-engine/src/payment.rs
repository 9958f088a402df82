//! # Payment Service
//!
//! Drives a charge through its provider and keeps the local record in step.
//!
//! ## Charge Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  start(order, provider)                                                 │
//! │    ├── order must be PENDING, unpaid, with amount_due > 0               │
//! │    ├── COD ──► Payment(PENDING), no provider call                       │
//! │    └── online ──► Payment(INITIATED) ──► gateway.start_charge           │
//! │                         │                       │                       │
//! │                         │              Err ──► FAILED  (ok = false)     │
//! │                         │              Ok  ──► store charge id          │
//! │                                                                         │
//! │  confirm(provider, charge_id) / webhook / resync                        │
//! │    └── gateway.confirm_charge                                           │
//! │          ├── Succeeded ──► SUCCEEDED + order PAID + loyalty EARN        │
//! │          ├── Failed    ──► FAILED                                       │
//! │          ├── Pending   ──► unchanged                                    │
//! │          └── Err       ──► FAILED                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Provider errors stop here: callers get an outcome with `ok = false` and a
//! generic message, and the payment row is left in a terminal state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use checkout_core::loyalty::LoyaltyProgram;
use checkout_core::{OrderStatus, Payment, PaymentProvider, PaymentStatus, CURRENCY};
use checkout_db::Database;

use crate::error::{EngineError, EngineResult, ProviderError};
use crate::gateway::{verify_signature, ChargeOutcome, ChargeRequest, GatewayRegistry};
use crate::notify::{Notifier, Template};

pub const PAYMENT_FAILED_MESSAGE: &str = "Payment could not be completed";

// =============================================================================
// Outcomes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub ok: bool,
    pub payment_id: String,
    pub redirect_or_client_secret: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOutcome {
    pub ok: bool,
    pub order_id: String,
    pub payment_id: String,
    pub status: PaymentStatus,
    pub message: String,
}

/// Body of `POST /webhooks/{provider}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub charge_id: String,
    /// `succeeded` or `failed`.
    pub status: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied(PaymentStatus),
    /// Unknown charge, unknown status, or a payment that already settled.
    Ignored,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct PaymentService {
    db: Database,
    gateways: GatewayRegistry,
    notifier: Arc<dyn Notifier>,
    loyalty: LoyaltyProgram,
}

impl PaymentService {
    pub fn new(
        db: Database,
        gateways: GatewayRegistry,
        notifier: Arc<dyn Notifier>,
        loyalty: LoyaltyProgram,
    ) -> Self {
        PaymentService {
            db,
            gateways,
            notifier,
            loyalty,
        }
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    /// `POST /payment/{provider}/start`.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn start(
        &self,
        user_id: &str,
        order_id: &str,
        provider: PaymentProvider,
    ) -> EngineResult<StartOutcome> {
        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;

        if order.status != OrderStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "Order is {} and cannot be paid",
                order.status
            )));
        }
        if self.db.payments().has_captured(order_id).await? {
            return Err(EngineError::InvalidState("Order is already paid".into()));
        }
        if !order.amount_due().is_positive() {
            return Err(EngineError::InvalidState("Nothing is owed on this order".into()));
        }

        let gateway = self
            .gateways
            .get(provider)
            .map_err(|_| EngineError::Rejected(format!("{} is not available", provider)))?;

        let initial = if provider.is_online() {
            PaymentStatus::Initiated
        } else {
            PaymentStatus::Pending
        };
        let payment = self
            .db
            .payments()
            .create(order_id, order.amount_due(), provider, initial)
            .await?;

        let request = ChargeRequest {
            order_id: order_id.to_string(),
            payment_id: payment.id.clone(),
            amount: order.amount_due(),
            currency: CURRENCY.to_string(),
        };

        match gateway.start_charge(&request).await {
            Ok(handle) => {
                if provider.is_online() {
                    self.db
                        .payments()
                        .set_charge_id(&payment.id, &handle.charge_id)
                        .await?;
                }
                info!(payment_id = %payment.id, charge_id = %handle.charge_id, "Charge started");
                Ok(StartOutcome {
                    ok: true,
                    payment_id: payment.id,
                    redirect_or_client_secret: Some(handle.redirect_or_client_secret),
                    message: None,
                })
            }
            Err(e) => {
                error!(payment_id = %payment.id, error = %e, "Charge could not be started");
                self.fail(&payment, user_id).await?;
                Ok(StartOutcome {
                    ok: false,
                    payment_id: payment.id,
                    redirect_or_client_secret: None,
                    message: Some(PAYMENT_FAILED_MESSAGE.to_string()),
                })
            }
        }
    }

    /// `POST /payment/{provider}/confirm`: asks the provider how the charge
    /// ended and settles the local record.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn confirm(&self, provider: PaymentProvider, charge_id: &str) -> EngineResult<ConfirmOutcome> {
        let payment = self
            .db
            .payments()
            .find_by_charge_id(provider, charge_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Payment", charge_id))?;

        let status = self.poll(&payment).await?;
        Ok(confirm_outcome(&payment, status))
    }

    /// Latest attempt for an order, whatever its status.
    pub async fn latest_payment(&self, order_id: &str) -> EngineResult<Option<Payment>> {
        Ok(self.db.payments().latest_for_order(order_id).await?)
    }

    /// Latest captured online charge for an order.
    ///
    /// When none is cached but an online attempt is still INITIATED, the
    /// provider is polled once before concluding there is none.
    #[instrument(skip(self))]
    pub async fn latest_successful_charge(&self, order_id: &str) -> EngineResult<Option<Payment>> {
        let payments = self.db.payments();
        if let Some(payment) = payments.latest_successful_charge(order_id).await? {
            return Ok(Some(payment));
        }

        let Some(unsettled) = payments.latest_unsettled_charge(order_id).await? else {
            return Ok(None);
        };

        info!(payment_id = %unsettled.id, "No captured charge cached, resyncing with provider");
        self.poll(&unsettled).await?;

        Ok(payments.latest_successful_charge(order_id).await?)
    }

    /// Verifies and applies a provider callback.
    #[instrument(skip(self, body, signature), fields(provider = %provider))]
    pub async fn handle_webhook(
        &self,
        provider: PaymentProvider,
        body: &[u8],
        signature: Option<&str>,
    ) -> EngineResult<WebhookOutcome> {
        let gateway = self.gateways.get(provider)?;
        let secret = gateway
            .webhook_secret()
            .ok_or(ProviderError::NotConfigured(provider))?;
        let signature = signature.ok_or(ProviderError::InvalidSignature)?;
        verify_signature(secret, body, signature)?;

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| EngineError::Rejected(format!("Malformed webhook payload: {}", e)))?;

        let Some(payment) = self
            .db
            .payments()
            .find_by_charge_id(provider, &event.charge_id)
            .await?
        else {
            warn!(charge_id = %event.charge_id, "Webhook for unknown charge");
            return Ok(WebhookOutcome::Ignored);
        };

        if payment.status.is_terminal_charge() {
            return Ok(WebhookOutcome::Ignored);
        }

        let outcome = match event.status.as_str() {
            "succeeded" => ChargeOutcome::Succeeded {
                transaction_id: event.transaction_id.unwrap_or_else(|| event.charge_id.clone()),
            },
            "failed" => ChargeOutcome::Failed {
                reason: event.reason.unwrap_or_else(|| "reported by provider".into()),
            },
            other => {
                warn!(status = %other, "Ignoring webhook status");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let status = self.apply(&payment, outcome).await?;
        Ok(WebhookOutcome::Applied(status))
    }

    /// Marks the pending COD payment for an order as collected.
    #[instrument(skip(self))]
    pub async fn reconcile_cod(&self, order_id: &str) -> EngineResult<Payment> {
        let payment = self
            .db
            .payments()
            .list_for_order(order_id)
            .await?
            .into_iter()
            .rev()
            .find(|p| p.provider == PaymentProvider::Cod && p.status == PaymentStatus::Pending)
            .ok_or_else(|| EngineError::InvalidState("No pending cash-on-delivery payment".into()))?;

        self.capture(&payment, None).await?;

        self.db
            .payments()
            .get_by_id(&payment.id)
            .await?
            .ok_or_else(|| EngineError::not_found("Payment", &payment.id))
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Asks the provider once and applies the answer. Returns the resulting
    /// local status.
    async fn poll(&self, payment: &Payment) -> EngineResult<PaymentStatus> {
        if payment.status.is_terminal_charge() || !payment.provider.is_online() {
            return Ok(payment.status);
        }
        let Some(charge_id) = payment.provider_charge_id.as_deref() else {
            return Ok(payment.status);
        };

        let outcome = match self.gateways.get(payment.provider) {
            Ok(gateway) => gateway.confirm_charge(charge_id).await,
            Err(e) => Err(e),
        };

        let outcome = outcome.unwrap_or_else(|e| {
            error!(payment_id = %payment.id, error = %e, "Charge confirmation failed");
            ChargeOutcome::Failed {
                reason: e.to_string(),
            }
        });

        self.apply(payment, outcome).await
    }

    async fn apply(&self, payment: &Payment, outcome: ChargeOutcome) -> EngineResult<PaymentStatus> {
        match outcome {
            ChargeOutcome::Succeeded { transaction_id } => {
                self.capture(payment, Some(&transaction_id)).await?;
                Ok(PaymentStatus::Succeeded)
            }
            ChargeOutcome::Failed { reason } => {
                warn!(payment_id = %payment.id, reason = %reason, "Charge failed");
                let user_id = self.order_owner(&payment.order_id).await?;
                self.fail(payment, &user_id).await?;
                Ok(PaymentStatus::Failed)
            }
            ChargeOutcome::Pending => Ok(payment.status),
        }
    }

    /// Records the capture; the first capture of an order earns points.
    async fn capture(&self, payment: &Payment, transaction_id: Option<&str>) -> EngineResult<()> {
        let captured = self
            .db
            .payments()
            .record_capture(&payment.id, transaction_id)
            .await?;
        if !captured {
            return Ok(());
        }

        let user_id = self.order_owner(&payment.order_id).await?;
        let points = self.loyalty.earn_points(payment.amount());
        if points > 0 {
            let note = format!("Earned on {}", payment.amount());
            self.db
                .loyalty()
                .earn(&user_id, &payment.order_id, points, &note)
                .await?;
        }

        self.notifier.notify(
            &user_id,
            Template::PaymentSucceeded,
            json!({
                "orderId": payment.order_id,
                "amount": payment.amount().to_decimal_string(),
                "pointsEarned": points,
            }),
        );
        Ok(())
    }

    async fn fail(&self, payment: &Payment, user_id: &str) -> EngineResult<()> {
        if self.db.payments().mark_failed(&payment.id).await? {
            self.notifier.notify(
                user_id,
                Template::PaymentFailed,
                json!({ "orderId": payment.order_id }),
            );
        }
        Ok(())
    }

    async fn order_owner(&self, order_id: &str) -> EngineResult<String> {
        self.db
            .orders()
            .get_by_id(order_id)
            .await?
            .map(|o| o.user_id)
            .ok_or_else(|| EngineError::not_found("Order", order_id))
    }
}

fn confirm_outcome(payment: &Payment, status: PaymentStatus) -> ConfirmOutcome {
    let (ok, message) = match status {
        PaymentStatus::Succeeded => (true, "Payment received".to_string()),
        PaymentStatus::Initiated | PaymentStatus::Pending => {
            (false, "Payment is still pending".to_string())
        }
        PaymentStatus::Failed => (false, PAYMENT_FAILED_MESSAGE.to_string()),
        other if other.is_captured() => (true, "Payment received".to_string()),
        _ => (false, PAYMENT_FAILED_MESSAGE.to_string()),
    };

    ConfirmOutcome {
        ok,
        order_id: payment.order_id.clone(),
        payment_id: payment.id.clone(),
        status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{sign, ChargeHandle};
    use crate::test_support::{engine, pending_order, FakeGateway};

    #[tokio::test]
    async fn test_start_and_confirm_earns_points_once() {
        let fake = FakeGateway::new(PaymentProvider::Stripe)
            .confirm_with(Ok(ChargeOutcome::Succeeded {
                transaction_id: "ch_1".into(),
            }));
        let t = engine(vec![fake.clone()]).await;
        let order_id = pending_order(&t.db, "alice", 2916).await;

        let started = t.payments.start("alice", &order_id, PaymentProvider::Stripe).await.unwrap();
        assert!(started.ok);
        assert_eq!(started.redirect_or_client_secret.as_deref(), Some("secret_pi_fake"));

        let confirmed = t.payments.confirm(PaymentProvider::Stripe, "pi_fake").await.unwrap();
        assert!(confirmed.ok);
        assert_eq!(confirmed.status, PaymentStatus::Succeeded);

        let order = t.db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(t.db.loyalty().balance("alice").await.unwrap(), 2);

        // a repeat confirm is a no-op
        t.payments.confirm(PaymentProvider::Stripe, "pi_fake").await.unwrap();
        assert_eq!(t.db.loyalty().balance("alice").await.unwrap(), 2);
        assert_eq!(fake.confirm_calls(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_is_terminal_and_reported() {
        let fake = FakeGateway::new(PaymentProvider::Stripe).start_with(Err(ProviderError::Timeout {
            provider: PaymentProvider::Stripe,
            secs: 15,
        }));
        let t = engine(vec![fake]).await;
        let order_id = pending_order(&t.db, "alice", 1000).await;

        let started = t.payments.start("alice", &order_id, PaymentProvider::Stripe).await.unwrap();
        assert!(!started.ok);
        assert_eq!(started.message.as_deref(), Some(PAYMENT_FAILED_MESSAGE));

        let latest = t.payments.latest_payment(&order_id).await.unwrap().unwrap();
        assert_eq!(latest.status, PaymentStatus::Failed);

        // a new attempt is allowed after a failure
        assert!(t.db.orders().get_by_id(&order_id).await.unwrap().unwrap().status == OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_confirm_error_marks_failed() {
        let fake = FakeGateway::new(PaymentProvider::Paypal).confirm_with(Err(ProviderError::Http {
            provider: PaymentProvider::Paypal,
            status: 502,
            body: "bad gateway".into(),
        }));
        let t = engine(vec![fake]).await;
        let order_id = pending_order(&t.db, "alice", 1000).await;

        t.payments.start("alice", &order_id, PaymentProvider::Paypal).await.unwrap();
        let confirmed = t.payments.confirm(PaymentProvider::Paypal, "pi_fake").await.unwrap();

        assert!(!confirmed.ok);
        assert_eq!(confirmed.status, PaymentStatus::Failed);
        assert_eq!(confirmed.message, PAYMENT_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_start_rejects_paid_and_foreign_orders() {
        let t = engine(vec![FakeGateway::new(PaymentProvider::Stripe)]).await;
        let order_id = pending_order(&t.db, "alice", 1000).await;

        let err = t.payments.start("mallory", &order_id, PaymentProvider::Stripe).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let err = t.payments.start("alice", &order_id, PaymentProvider::Paypal).await.unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));

        t.db.orders().set_status(&order_id, OrderStatus::Paid).await.unwrap();
        let err = t.payments.start("alice", &order_id, PaymentProvider::Stripe).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_resync_finds_capture_once() {
        let fake = FakeGateway::new(PaymentProvider::Stripe).confirm_with(Ok(ChargeOutcome::Succeeded {
            transaction_id: "ch_9".into(),
        }));
        let t = engine(vec![fake.clone()]).await;
        let order_id = pending_order(&t.db, "alice", 5000).await;
        t.payments.start("alice", &order_id, PaymentProvider::Stripe).await.unwrap();

        let charge = t.payments.latest_successful_charge(&order_id).await.unwrap().unwrap();
        assert_eq!(charge.provider_transaction_id.as_deref(), Some("ch_9"));

        t.payments.latest_successful_charge(&order_id).await.unwrap();
        assert_eq!(fake.confirm_calls(), 1);
    }

    #[tokio::test]
    async fn test_resync_pending_leaves_no_charge() {
        let fake = FakeGateway::new(PaymentProvider::Stripe).confirm_with(Ok(ChargeOutcome::Pending));
        let t = engine(vec![fake]).await;
        let order_id = pending_order(&t.db, "alice", 5000).await;
        t.payments.start("alice", &order_id, PaymentProvider::Stripe).await.unwrap();

        assert!(t.payments.latest_successful_charge(&order_id).await.unwrap().is_none());
        let latest = t.payments.latest_payment(&order_id).await.unwrap().unwrap();
        assert_eq!(latest.status, PaymentStatus::Initiated);
    }

    #[tokio::test]
    async fn test_webhook_signature_and_idempotency() {
        let fake = FakeGateway::new(PaymentProvider::Stripe).with_webhook_secret("whsec_test");
        let t = engine(vec![fake]).await;
        let order_id = pending_order(&t.db, "alice", 1200).await;
        t.payments.start("alice", &order_id, PaymentProvider::Stripe).await.unwrap();

        let body = br#"{"chargeId":"pi_fake","status":"succeeded","transactionId":"ch_wh"}"#;

        let err = t
            .payments
            .handle_webhook(PaymentProvider::Stripe, body, Some("deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Provider(ProviderError::InvalidSignature)));

        let sig = sign("whsec_test", body).unwrap();
        let applied = t
            .payments
            .handle_webhook(PaymentProvider::Stripe, body, Some(&sig))
            .await
            .unwrap();
        assert_eq!(applied, WebhookOutcome::Applied(PaymentStatus::Succeeded));

        let again = t
            .payments
            .handle_webhook(PaymentProvider::Stripe, body, Some(&sig))
            .await
            .unwrap();
        assert_eq!(again, WebhookOutcome::Ignored);
        assert_eq!(t.db.loyalty().balance("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cod_reconciliation() {
        let t = engine(vec![]).await;
        let order_id = pending_order(&t.db, "alice", 4500).await;

        let started = t.payments.start("alice", &order_id, PaymentProvider::Cod).await.unwrap();
        assert!(started.ok);
        let latest = t.payments.latest_payment(&order_id).await.unwrap().unwrap();
        assert_eq!(latest.status, PaymentStatus::Pending);

        let paid = t.payments.reconcile_cod(&order_id).await.unwrap();
        assert_eq!(paid.status, PaymentStatus::Succeeded);
        assert!(t.payments.latest_successful_charge(&order_id).await.unwrap().is_none());

        let order = t.db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(t.db.loyalty().balance("alice").await.unwrap(), 4);

        assert!(t.payments.reconcile_cod(&order_id).await.is_err());
    }

    #[test]
    fn test_handle_serializes_camel_case() {
        let handle = ChargeHandle {
            charge_id: "pi_1".into(),
            redirect_or_client_secret: "secret".into(),
        };
        let v = serde_json::to_value(&handle).unwrap();
        assert_eq!(v["redirectOrClientSecret"], "secret");
    }
}
