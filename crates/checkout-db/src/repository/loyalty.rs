//! # Loyalty Repository
//!
//! Points wallet plus its append-only ledger.
//!
//! ```text
//! loyalty_wallets.points  ==  Σ loyalty_ledger.points  (per user)
//!
//! EARN   → +n row, wallet += n      (at most one EARN per order)
//! REDEEM → −n row, wallet −= n      (guarded: WHERE points >= n)
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{begin_write, new_id};
use crate::error::{DbError, DbResult};
use checkout_core::{LoyaltyEntry, LoyaltyEntryKind, LoyaltyWallet};

#[derive(Debug, Clone)]
pub struct LoyaltyRepository {
    pool: SqlitePool,
}

impl LoyaltyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LoyaltyRepository { pool }
    }

    /// The user's wallet; an empty one if they have never earned.
    pub async fn wallet(&self, user_id: &str) -> DbResult<LoyaltyWallet> {
        let wallet = sqlx::query_as::<_, LoyaltyWallet>(
            "SELECT user_id, points, updated_at FROM loyalty_wallets WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet.unwrap_or_else(|| LoyaltyWallet {
            user_id: user_id.to_string(),
            points: 0,
            updated_at: Utc::now(),
        }))
    }

    pub async fn balance(&self, user_id: &str) -> DbResult<i64> {
        Ok(self.wallet(user_id).await?.points)
    }

    /// Ledger entries, oldest first.
    pub async fn ledger(&self, user_id: &str) -> DbResult<Vec<LoyaltyEntry>> {
        let entries = sqlx::query_as::<_, LoyaltyEntry>(
            r#"
            SELECT id, user_id, order_id, kind, points, note, created_at
            FROM loyalty_ledger
            WHERE user_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Credits `points` for a paid order. Returns `false` when the order
    /// already earned (or `points` is not positive) and nothing changed.
    pub async fn earn(&self, user_id: &str, order_id: &str, points: i64, note: &str) -> DbResult<bool> {
        let mut tx = begin_write(&self.pool).await?;
        let earned = earn_in(&mut *tx, user_id, order_id, points, note).await?;
        tx.commit().await?;
        Ok(earned)
    }

    /// Debits `points`, returning the new balance.
    pub async fn redeem(&self, user_id: &str, order_id: Option<&str>, points: i64, note: &str) -> DbResult<i64> {
        let mut tx = begin_write(&self.pool).await?;
        redeem_in(&mut *tx, user_id, order_id, points, note).await?;
        let balance: i64 = sqlx::query_scalar("SELECT points FROM loyalty_wallets WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(balance)
    }
}

pub(crate) async fn earn_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    order_id: &str,
    points: i64,
    note: &str,
) -> DbResult<bool> {
    if points <= 0 {
        return Ok(false);
    }

    let now = Utc::now();

    // The partial unique index on EARN rows makes this a no-op on repeat.
    let inserted = sqlx::query(
        r#"
        INSERT OR IGNORE INTO loyalty_ledger (id, user_id, order_id, kind, points, note, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(order_id)
    .bind(LoyaltyEntryKind::Earn)
    .bind(points)
    .bind(note)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted == 0 {
        debug!(order_id = %order_id, "Order already earned loyalty points");
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO loyalty_wallets (user_id, points, updated_at) VALUES (?1, ?2, ?3)
        ON CONFLICT(user_id) DO UPDATE SET
            points = points + excluded.points,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(points)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    info!(user_id = %user_id, order_id = %order_id, points, "Loyalty points earned");
    Ok(true)
}

pub(crate) async fn redeem_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    order_id: Option<&str>,
    points: i64,
    note: &str,
) -> DbResult<()> {
    if points <= 0 {
        return Err(DbError::conflict("Loyalty wallet", user_id, "redemption must be positive"));
    }

    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE loyalty_wallets SET points = points - ?1, updated_at = ?2
        WHERE user_id = ?3 AND points >= ?1
        "#,
    )
    .bind(points)
    .bind(now)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("Loyalty wallet", user_id, "insufficient points"));
    }

    sqlx::query(
        r#"
        INSERT INTO loyalty_ledger (id, user_id, order_id, kind, points, note, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(order_id)
    .bind(LoyaltyEntryKind::Redeem)
    .bind(-points)
    .bind(note)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    info!(user_id = %user_id, points, "Loyalty points redeemed");
    Ok(())
}
