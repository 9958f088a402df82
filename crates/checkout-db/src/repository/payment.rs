//! # Payment Repository
//!
//! Payment attempts and the refunds recorded against them.
//!
//! ## Payment State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  create(INITIATED) ──► record_capture ──► SUCCEEDED ──► create_refund   │
//! │         │                                                   │           │
//! │         └──► mark_failed ──► FAILED              REFUND_INITIATED       │
//! │                                                   │              │      │
//! │  create(PENDING)  (COD)                complete_refund    fail_refund   │
//! │         │                                     │              │          │
//! │         └──► record_capture (manual)      REFUNDED     REFUND_FAILED    │
//! │                                                                         │
//! │  Every transition is `UPDATE .. WHERE status IN (expected)`; a row      │
//! │  in a terminal charge state is never moved back.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Refund Ceiling
//! `Σ refunds(initiated | completed) ≤ payment.amount` is enforced when the
//! refund row is created: the requested amount is clamped to what is left.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::{begin_write, new_id};
use super::order::mark_paid_in;
use crate::error::{DbError, DbResult};
use checkout_core::{Money, Payment, PaymentProvider, PaymentStatus, Refund, RefundStatus, CURRENCY};

const PAYMENT_COLUMNS: &str = r#"
    id, order_id, amount_cents, currency, status, provider,
    provider_charge_id, provider_transaction_id,
    refund_external_id, refund_reason, refunded, refunded_at,
    created_at, updated_at
"#;

const REFUND_COLUMNS: &str = r#"
    id, payment_id, order_id, amount_cents, status,
    provider_refund_id, reason, created_at, completed_at
"#;

const CAPTURED_STATUSES: &str = "('succeeded', 'refund_initiated', 'refunded', 'refund_failed')";

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Records a new charge attempt.
    pub async fn create(
        &self,
        order_id: &str,
        amount: Money,
        provider: PaymentProvider,
        status: PaymentStatus,
    ) -> DbResult<Payment> {
        let now = Utc::now();
        let payment = Payment {
            id: new_id(),
            order_id: order_id.to_string(),
            amount_cents: amount.cents(),
            currency: CURRENCY.to_string(),
            status,
            provider,
            provider_charge_id: None,
            provider_transaction_id: None,
            refund_external_id: None,
            refund_reason: None,
            refunded: false,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        };

        debug!(
            payment_id = %payment.id,
            order_id = %order_id,
            provider = %provider,
            amount = %amount,
            "Creating payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, amount_cents, currency, status, provider,
                refunded, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(payment.provider)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Stores the provider's handle for a just-started charge.
    pub async fn set_charge_id(&self, payment_id: &str, charge_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE payments SET provider_charge_id = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'initiated'",
        )
        .bind(charge_id)
        .bind(Utc::now())
        .bind(payment_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Payment", payment_id, "not initiated"));
        }
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        self.fetch_one_where("id = ?1", id).await
    }

    /// Finds the attempt a provider callback refers to.
    pub async fn find_by_charge_id(
        &self,
        provider: PaymentProvider,
        charge_id: &str,
    ) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE provider = ?1 AND provider_charge_id = ?2
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            PAYMENT_COLUMNS
        ))
        .bind(provider)
        .bind(charge_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// The latest attempt for an order, whatever its status.
    pub async fn latest_for_order(&self, order_id: &str) -> DbResult<Option<Payment>> {
        self.fetch_one_where("order_id = ?1", order_id).await
    }

    /// The latest online charge that captured funds.
    pub async fn latest_successful_charge(&self, order_id: &str) -> DbResult<Option<Payment>> {
        self.fetch_one_where(
            &format!("order_id = ?1 AND provider != 'cod' AND status IN {}", CAPTURED_STATUSES),
            order_id,
        )
        .await
    }

    /// The latest online attempt still waiting on the provider, if it has a
    /// provider handle to poll.
    pub async fn latest_unsettled_charge(&self, order_id: &str) -> DbResult<Option<Payment>> {
        self.fetch_one_where(
            "order_id = ?1 AND provider != 'cod' AND status = 'initiated' AND provider_charge_id IS NOT NULL",
            order_id,
        )
        .await
    }

    /// Whether any attempt (COD included) has captured funds.
    pub async fn has_captured(&self, order_id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM payments WHERE order_id = ?1 AND status IN {}",
            CAPTURED_STATUSES
        ))
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE order_id = ?1 ORDER BY created_at, rowid",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Moves an INITIATED or PENDING attempt to SUCCEEDED and its order to
    /// PAID, atomically. Returns `false` if the attempt had already settled.
    pub async fn record_capture(&self, payment_id: &str, transaction_id: Option<&str>) -> DbResult<bool> {
        let mut tx = begin_write(&self.pool).await?;

        let order_id: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE payments SET
                status = 'succeeded',
                provider_transaction_id = COALESCE(?1, provider_transaction_id),
                updated_at = ?2
            WHERE id = ?3 AND status IN ('initiated', 'pending')
            RETURNING order_id
            "#,
        )
        .bind(transaction_id)
        .bind(Utc::now())
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = order_id else {
            debug!(payment_id = %payment_id, "Capture ignored, payment already settled");
            return Ok(false);
        };

        let order_moved = mark_paid_in(&mut *tx, &order_id).await?;
        tx.commit().await?;

        info!(
            payment_id = %payment_id,
            order_id = %order_id,
            order_marked_paid = order_moved,
            "Payment captured"
        );
        Ok(true)
    }

    /// Moves an unsettled attempt to FAILED. Returns `false` if it had
    /// already settled.
    pub async fn mark_failed(&self, payment_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'failed', updated_at = ?1 WHERE id = ?2 AND status IN ('initiated', 'pending')",
        )
        .bind(Utc::now())
        .bind(payment_id)
        .execute(&self.pool)
        .await?;

        let moved = result.rows_affected() == 1;
        if moved {
            warn!(payment_id = %payment_id, "Payment marked failed");
        }
        Ok(moved)
    }

    async fn fetch_one_where(&self, predicate: &str, arg: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT 1",
            PAYMENT_COLUMNS, predicate
        ))
        .bind(arg)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    /// Opens a refund against a captured payment.
    ///
    /// The amount is clamped to what the payment still has unrefunded;
    /// `None` means nothing is left and no row was written.
    pub async fn create_refund(
        &self,
        payment_id: &str,
        requested: Money,
        reason: &str,
    ) -> DbResult<Option<Refund>> {
        let mut tx = begin_write(&self.pool).await?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE id = ?1",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Payment", payment_id))?;

        if !payment.status.is_captured() {
            return Err(DbError::conflict("Payment", payment_id, "no captured funds"));
        }

        let committed: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM refunds WHERE payment_id = ?1 AND status IN ('initiated', 'completed')",
        )
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await?;

        let remaining = payment.amount().saturating_sub_floor(Money::from_cents(committed));
        let amount = requested.min(remaining);
        if !amount.is_positive() {
            debug!(payment_id = %payment_id, "Nothing left to refund");
            return Ok(None);
        }

        let now = Utc::now();
        let refund = Refund {
            id: new_id(),
            payment_id: payment.id.clone(),
            order_id: payment.order_id.clone(),
            amount_cents: amount.cents(),
            status: RefundStatus::Initiated,
            provider_refund_id: None,
            reason: reason.to_string(),
            created_at: now,
            completed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO refunds (id, payment_id, order_id, amount_cents, status, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.payment_id)
        .bind(&refund.order_id)
        .bind(refund.amount_cents)
        .bind(refund.status)
        .bind(&refund.reason)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE payments SET status = 'refund_initiated', refund_reason = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(reason)
        .bind(now)
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            refund_id = %refund.id,
            payment_id = %payment_id,
            requested = %requested,
            amount = %amount,
            "Refund initiated"
        );
        Ok(Some(refund))
    }

    /// Marks a refund completed and mirrors it onto the payment.
    pub async fn complete_refund(&self, refund_id: &str, provider_refund_id: &str) -> DbResult<Payment> {
        let mut tx = begin_write(&self.pool).await?;
        let now = Utc::now();

        let payment_id: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE refunds SET status = 'completed', provider_refund_id = ?1, completed_at = ?2
            WHERE id = ?3 AND status = 'initiated'
            RETURNING payment_id
            "#,
        )
        .bind(provider_refund_id)
        .bind(now)
        .bind(refund_id)
        .fetch_optional(&mut *tx)
        .await?;

        let payment_id =
            payment_id.ok_or_else(|| DbError::conflict("Refund", refund_id, "not initiated"))?;

        let completed: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM refunds WHERE payment_id = ?1 AND status = 'completed'",
        )
        .bind(&payment_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE payments SET
                status = 'refunded',
                refund_external_id = ?1,
                refunded = CASE WHEN ?2 >= amount_cents THEN 1 ELSE 0 END,
                refunded_at = ?3,
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(provider_refund_id)
        .bind(completed)
        .bind(now)
        .bind(&payment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(refund_id = %refund_id, payment_id = %payment_id, "Refund completed");

        self.get_by_id(&payment_id)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", &payment_id))
    }

    /// Marks a refund failed; the payment is flagged for manual follow-up.
    pub async fn fail_refund(&self, refund_id: &str, reason: &str) -> DbResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        let now = Utc::now();

        let payment_id: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE refunds SET status = 'failed', completed_at = ?1
            WHERE id = ?2 AND status = 'initiated'
            RETURNING payment_id
            "#,
        )
        .bind(now)
        .bind(refund_id)
        .fetch_optional(&mut *tx)
        .await?;

        let payment_id =
            payment_id.ok_or_else(|| DbError::conflict("Refund", refund_id, "not initiated"))?;

        sqlx::query(
            "UPDATE payments SET status = 'refund_failed', refund_reason = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(reason)
        .bind(now)
        .bind(&payment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        warn!(refund_id = %refund_id, payment_id = %payment_id, reason = %reason, "Refund failed");
        Ok(())
    }

    pub async fn get_refund(&self, refund_id: &str) -> DbResult<Option<Refund>> {
        let refund = sqlx::query_as::<_, Refund>(&format!(
            "SELECT {} FROM refunds WHERE id = ?1",
            REFUND_COLUMNS
        ))
        .bind(refund_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(refund)
    }

    pub async fn list_refunds(&self, payment_id: &str) -> DbResult<Vec<Refund>> {
        let refunds = sqlx::query_as::<_, Refund>(&format!(
            "SELECT {} FROM refunds WHERE payment_id = ?1 ORDER BY created_at, rowid",
            REFUND_COLUMNS
        ))
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(refunds)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
