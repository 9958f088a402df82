//! # Coupon Repository
//!
//! Coupon catalog lookups and the one-time-use marker table.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::new_id;
use crate::error::DbResult;
use checkout_core::Coupon;

#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Looks a coupon up by its normalized (upper-case) code, active or not,
    /// so the caller can report *why* it is unusable.
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT id, code, kind, value, min_subtotal_cents,
                   starts_on, expires_on, is_active
            FROM coupons
            WHERE code = ?1
            "#,
        )
        .bind(code.to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }

    /// `findActiveCoupon(code)`.
    pub async fn find_active_coupon(&self, code: &str) -> DbResult<Option<Coupon>> {
        Ok(self.find_by_code(code).await?.filter(|c| c.is_active))
    }

    pub async fn insert(&self, coupon: &Coupon) -> DbResult<()> {
        debug!(code = %coupon.code, kind = ?coupon.kind, "Inserting coupon");

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, kind, value, min_subtotal_cents,
                starts_on, expires_on, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&coupon.id)
        .bind(coupon.code.to_ascii_uppercase())
        .bind(coupon.kind)
        .bind(coupon.value)
        .bind(coupon.min_subtotal_cents)
        .bind(coupon.starts_on)
        .bind(coupon.expires_on)
        .bind(coupon.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Whether `user_id` has already redeemed `coupon_id`.
    pub async fn has_redeemed(&self, user_id: &str, coupon_id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coupon_redemptions WHERE user_id = ?1 AND coupon_id = ?2",
        )
        .bind(user_id)
        .bind(coupon_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

/// Writes the one-time-use marker. The `(user_id, coupon_id)` UNIQUE index
/// turns a concurrent second use into a `UniqueViolation`.
pub(crate) async fn record_redemption_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    coupon_id: &str,
    order_id: &str,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO coupon_redemptions (id, user_id, coupon_id, order_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(coupon_id)
    .bind(order_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
