//! # Gift Card Repository
//!
//! The stored-value ledger.
//!
//! ## Balance Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  original_cents = balance_cents + Σ gift_card_redemptions.amount_cents  │
//! │                                                                         │
//! │  consume():  balance −= d   and  INSERT redemption(d)   (same tx)       │
//! │  top_up():   balance += t   and  original += t           (same UPDATE)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every debit is `UPDATE .. WHERE balance_cents >= ?`. If a concurrent
//! checkout got there first the guard misses and the whole consumption is
//! rolled back, so interleaved readers can never overdraw a card.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::{begin_write, new_id};
use crate::error::{DbError, DbResult};
use checkout_core::gift_card::{plan_consumption, usable_balance};
use checkout_core::{GiftCard, GiftCardRedemption, Money};

const CARD_COLUMNS: &str = r#"
    id, code, original_cents, balance_cents, owner_user_id,
    is_active, expires_on, created_at
"#;

/// Result of claiming a card by code.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The caller is now the owner.
    Claimed(GiftCard),
    /// The caller already owned it; nothing changed.
    AlreadyOwned(GiftCard),
    /// Someone else owns it.
    OwnedByAnother,
}

#[derive(Debug, Clone)]
pub struct GiftCardRepository {
    pool: SqlitePool,
}

impl GiftCardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        GiftCardRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<GiftCard>> {
        let card = sqlx::query_as::<_, GiftCard>(&format!(
            "SELECT {} FROM gift_cards WHERE code = ?1",
            CARD_COLUMNS
        ))
        .bind(code.to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(card)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<GiftCard>> {
        let card = sqlx::query_as::<_, GiftCard>(&format!(
            "SELECT {} FROM gift_cards WHERE id = ?1",
            CARD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(card)
    }

    /// Every card owned by `user_id`, usable or not.
    pub async fn list_for_user(&self, user_id: &str) -> DbResult<Vec<GiftCard>> {
        let cards = sqlx::query_as::<_, GiftCard>(&format!(
            "SELECT {} FROM gift_cards WHERE owner_user_id = ?1 ORDER BY created_at, id",
            CARD_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    /// `usableBalance(user)`: Σ balance of active, unexpired cards.
    pub async fn usable_balance(&self, user_id: &str, today: NaiveDate) -> DbResult<Money> {
        let cards = self.list_for_user(user_id).await?;
        Ok(usable_balance(&cards, today))
    }

    pub async fn redemptions(&self, gift_card_id: &str) -> DbResult<Vec<GiftCardRedemption>> {
        let rows = sqlx::query_as::<_, GiftCardRedemption>(
            r#"
            SELECT id, gift_card_id, order_id, amount_cents, reason, created_at
            FROM gift_card_redemptions
            WHERE gift_card_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(gift_card_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// `consume(user, requestedAmount, reason, orderId)`.
    ///
    /// Returns the amount actually covered, which is less than `requested`
    /// when the user's usable balance runs out. All per-card debits commit
    /// together or not at all.
    pub async fn consume(
        &self,
        user_id: &str,
        requested: Money,
        reason: &str,
        order_id: Option<&str>,
        today: NaiveDate,
    ) -> DbResult<Money> {
        let mut tx = begin_write(&self.pool).await?;
        let covered = consume_in(&mut *tx, user_id, requested, reason, order_id, today).await?;
        tx.commit().await?;
        Ok(covered)
    }

    /// `redeemToUser(user, code)`: the first claimant becomes the owner.
    pub async fn redeem_to_user(&self, user_id: &str, code: &str) -> DbResult<ClaimOutcome> {
        let code = code.to_ascii_uppercase();

        let claimed = sqlx::query(
            "UPDATE gift_cards SET owner_user_id = ?1 WHERE code = ?2 AND owner_user_id IS NULL",
        )
        .bind(user_id)
        .bind(&code)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        let card = self
            .get_by_code(&code)
            .await?
            .ok_or_else(|| DbError::not_found("Gift card", &code))?;

        if claimed {
            info!(card_id = %card.id, user_id = %user_id, "Gift card claimed");
            return Ok(ClaimOutcome::Claimed(card));
        }

        match card.owner_user_id.as_deref() {
            Some(owner) if owner == user_id => Ok(ClaimOutcome::AlreadyOwned(card)),
            _ => {
                warn!(card_id = %card.id, user_id = %user_id, "Gift card already claimed by another user");
                Ok(ClaimOutcome::OwnedByAnother)
            }
        }
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Issues a new, unowned, active card.
    pub async fn issue(
        &self,
        code: &str,
        amount: Money,
        expires_on: Option<NaiveDate>,
    ) -> DbResult<GiftCard> {
        let card = GiftCard {
            id: new_id(),
            code: code.to_ascii_uppercase(),
            original_cents: amount.cents(),
            balance_cents: amount.cents(),
            owner_user_id: None,
            is_active: true,
            expires_on,
            created_at: Utc::now(),
        };

        debug!(code = %card.code, amount = %amount, "Issuing gift card");

        sqlx::query(
            r#"
            INSERT INTO gift_cards (
                id, code, original_cents, balance_cents, owner_user_id,
                is_active, expires_on, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&card.id)
        .bind(&card.code)
        .bind(card.original_cents)
        .bind(card.balance_cents)
        .bind(&card.owner_user_id)
        .bind(card.is_active)
        .bind(card.expires_on)
        .bind(card.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &card.code),
            other => other,
        })?;

        Ok(card)
    }

    /// Adds value to a card. Original and balance move together and the card
    /// is re-activated.
    pub async fn top_up(&self, code: &str, amount: Money) -> DbResult<GiftCard> {
        let code = code.to_ascii_uppercase();

        let result = sqlx::query(
            r#"
            UPDATE gift_cards SET
                original_cents = original_cents + ?1,
                balance_cents = balance_cents + ?1,
                is_active = 1
            WHERE code = ?2
            "#,
        )
        .bind(amount.cents())
        .bind(&code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Gift card", &code));
        }

        info!(code = %code, amount = %amount, "Gift card topped up");

        self.get_by_code(&code)
            .await?
            .ok_or_else(|| DbError::not_found("Gift card", &code))
    }
}

/// Consumption inside a caller-owned transaction.
pub(crate) async fn consume_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    requested: Money,
    reason: &str,
    order_id: Option<&str>,
    today: NaiveDate,
) -> DbResult<Money> {
    if !requested.is_positive() {
        return Ok(Money::zero());
    }

    let cards = sqlx::query_as::<_, GiftCard>(&format!(
        "SELECT {} FROM gift_cards WHERE owner_user_id = ?1 AND is_active = 1 AND balance_cents > 0",
        CARD_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let plan = plan_consumption(cards, requested, today);
    let now = Utc::now();

    for debit in &plan.debits {
        let amount = debit.amount.cents();

        let result = sqlx::query(
            r#"
            UPDATE gift_cards SET
                balance_cents = balance_cents - ?1,
                is_active = CASE WHEN balance_cents - ?1 = 0 THEN 0 ELSE is_active END
            WHERE id = ?2 AND is_active = 1 AND balance_cents >= ?1
            "#,
        )
        .bind(amount)
        .bind(&debit.gift_card_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict(
                "Gift card",
                &debit.gift_card_id,
                "balance changed during consumption",
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO gift_card_redemptions (id, gift_card_id, order_id, amount_cents, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(new_id())
        .bind(&debit.gift_card_id)
        .bind(order_id)
        .bind(amount)
        .bind(reason)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        debug!(
            card_id = %debit.gift_card_id,
            amount = %debit.amount,
            exhausted = debit.exhausts,
            "Gift card debited"
        );
    }

    info!(
        user_id = %user_id,
        requested = %requested,
        covered = %plan.covered,
        cards = plan.debits.len(),
        "Gift card balance consumed"
    );

    Ok(plan.covered)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{file_db, test_db};
    use super::*;

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    async fn assert_ledger_balanced(repo: &GiftCardRepository, card: &GiftCard) {
        let fresh = repo.get_by_id(&card.id).await.unwrap().unwrap();
        let redeemed: i64 = repo
            .redemptions(&card.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.amount_cents)
            .sum();
        assert_eq!(fresh.original_cents, fresh.balance_cents + redeemed);
    }

    #[tokio::test]
    async fn test_consume_more_than_balance() {
        let db = test_db().await;
        let repo = db.gift_cards();

        let card = repo.issue("gift-15", Money::from_cents(1500), None).await.unwrap();
        repo.redeem_to_user("alice", "GIFT-15").await.unwrap();

        let covered = repo
            .consume("alice", Money::from_cents(2000), "order", None, today())
            .await
            .unwrap();

        assert_eq!(covered.cents(), 1500);
        let fresh = repo.get_by_id(&card.id).await.unwrap().unwrap();
        assert_eq!(fresh.balance_cents, 0);
        assert!(!fresh.is_active);
        assert_ledger_balanced(&repo, &card).await;
    }

    #[tokio::test]
    async fn test_consume_splits_across_cards() {
        let db = test_db().await;
        let repo = db.gift_cards();

        let soon = today() + chrono::Duration::days(10);
        let a = repo.issue("A", Money::from_cents(1000), Some(soon)).await.unwrap();
        let b = repo.issue("B", Money::from_cents(1000), None).await.unwrap();
        repo.redeem_to_user("alice", "A").await.unwrap();
        repo.redeem_to_user("alice", "B").await.unwrap();

        assert_eq!(repo.usable_balance("alice", today()).await.unwrap().cents(), 2000);

        let covered = repo
            .consume("alice", Money::from_cents(1300), "order", None, today())
            .await
            .unwrap();
        assert_eq!(covered.cents(), 1300);

        let a_now = repo.get_by_id(&a.id).await.unwrap().unwrap();
        let b_now = repo.get_by_id(&b.id).await.unwrap().unwrap();
        assert_eq!(a_now.balance_cents, 0);
        assert_eq!(b_now.balance_cents, 700);

        for card in [&a, &b] {
            assert_ledger_balanced(&repo, card).await;
        }
    }

    #[tokio::test]
    async fn test_repeated_consumption_keeps_ledger_balanced() {
        let db = test_db().await;
        let repo = db.gift_cards();

        let card = repo.issue("MANY", Money::from_cents(5000), None).await.unwrap();
        repo.redeem_to_user("alice", "MANY").await.unwrap();

        for cents in [1, 999, 1234, 2000, 5000] {
            repo.consume("alice", Money::from_cents(cents), "order", None, today())
                .await
                .unwrap();
            assert_ledger_balanced(&repo, &card).await;
        }

        let fresh = repo.get_by_id(&card.id).await.unwrap().unwrap();
        assert_eq!(fresh.balance_cents, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_consumption_never_overdraws() {
        let (_dir, db) = file_db().await;
        let repo = db.gift_cards();

        let card = repo.issue("RACE", Money::from_cents(1500), None).await.unwrap();
        repo.redeem_to_user("alice", "RACE").await.unwrap();

        let first = db.gift_cards();
        let second = db.gift_cards();
        let (a, b) = tokio::join!(
            first.consume("alice", Money::from_cents(1500), "order a", None, today()),
            second.consume("alice", Money::from_cents(1500), "order b", None, today()),
        );

        // the later writer sees the drained card and covers nothing
        let mut covered = vec![a.unwrap().cents(), b.unwrap().cents()];
        covered.sort();
        assert_eq!(covered, vec![0, 1500]);

        let fresh = repo.get_by_id(&card.id).await.unwrap().unwrap();
        assert_eq!(fresh.balance_cents, 0);
        assert!(!fresh.is_active);
        assert_eq!(repo.redemptions(&card.id).await.unwrap().len(), 1);
        assert_ledger_balanced(&repo, &card).await;
    }

    #[tokio::test]
    async fn test_claim_rules() {
        let db = test_db().await;
        let repo = db.gift_cards();
        repo.issue("CLAIM", Money::from_cents(500), None).await.unwrap();

        assert!(matches!(
            repo.redeem_to_user("alice", "claim").await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        assert!(matches!(
            repo.redeem_to_user("alice", "CLAIM").await.unwrap(),
            ClaimOutcome::AlreadyOwned(_)
        ));
        assert!(matches!(
            repo.redeem_to_user("bob", "CLAIM").await.unwrap(),
            ClaimOutcome::OwnedByAnother
        ));
        assert!(repo.redeem_to_user("bob", "NOPE").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_top_up_preserves_ledger() {
        let db = test_db().await;
        let repo = db.gift_cards();

        let card = repo.issue("TOP", Money::from_cents(1000), None).await.unwrap();
        repo.redeem_to_user("alice", "TOP").await.unwrap();
        repo.consume("alice", Money::from_cents(1000), "order", None, today())
            .await
            .unwrap();

        let topped = repo.top_up("TOP", Money::from_cents(2500)).await.unwrap();

        assert!(topped.is_active);
        assert_eq!(topped.balance_cents, 2500);
        assert_eq!(topped.original_cents, 3500);
        assert_ledger_balanced(&repo, &card).await;
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let db = test_db().await;
        let repo = db.gift_cards();

        repo.issue("DUP", Money::from_cents(100), None).await.unwrap();
        let err = repo.issue("dup", Money::from_cents(100), None).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
