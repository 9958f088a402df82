//! # Gift Card Allocation
//!
//! Decides which cards cover how much of a requested amount. The database
//! layer executes the plan atomically, one guarded debit per card.
//!
//! ## Consumption Order
//! ```text
//!   usable cards ──► sort by (expires_on ASC, no-expiry last, id ASC)
//!                       │
//!                       ▼
//!   for each card: debit = min(balance, remaining)   stop when remaining = 0
//! ```

use chrono::NaiveDate;

use crate::money::Money;
use crate::types::GiftCard;

/// One planned debit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDebit {
    pub gift_card_id: String,
    pub amount: Money,
    /// The card is emptied by this debit and will be deactivated.
    pub exhausts: bool,
}

/// The result of allocating a requested amount across cards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsumptionPlan {
    pub debits: Vec<CardDebit>,
    /// What the cards actually cover; may be less than requested.
    pub covered: Money,
}

impl ConsumptionPlan {
    pub fn is_empty(&self) -> bool {
        self.debits.is_empty()
    }
}

/// Sum of balances of cards usable on `today`.
pub fn usable_balance(cards: &[GiftCard], today: NaiveDate) -> Money {
    cards
        .iter()
        .filter(|c| c.is_usable(today))
        .map(GiftCard::balance)
        .sum()
}

/// Orders cards soonest-expiring first; cards without expiry go last; ties
/// break on id.
pub fn consumption_order(cards: &mut [GiftCard]) {
    cards.sort_by(|a, b| {
        let a_key = (a.expires_on.is_none(), a.expires_on);
        let b_key = (b.expires_on.is_none(), b.expires_on);
        a_key.cmp(&b_key).then_with(|| a.id.cmp(&b.id))
    });
}

/// Plans debits covering up to `requested` from the usable cards.
///
/// ```rust
/// use chrono::{NaiveDate, Utc};
/// use checkout_core::gift_card::plan_consumption;
/// use checkout_core::{GiftCard, Money};
///
/// let card = GiftCard {
///     id: "gc-1".into(),
///     code: "GIFT-1".into(),
///     original_cents: 1500,
///     balance_cents: 1500,
///     owner_user_id: Some("u1".into()),
///     is_active: true,
///     expires_on: None,
///     created_at: Utc::now(),
/// };
/// let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
///
/// let plan = plan_consumption(vec![card], Money::from_cents(2000), today);
/// assert_eq!(plan.covered.cents(), 1500);
/// assert!(plan.debits[0].exhausts);
/// ```
pub fn plan_consumption(
    mut cards: Vec<GiftCard>,
    requested: Money,
    today: NaiveDate,
) -> ConsumptionPlan {
    let mut plan = ConsumptionPlan::default();
    if !requested.is_positive() {
        return plan;
    }

    cards.retain(|c| c.is_usable(today));
    consumption_order(&mut cards);

    let mut remaining = requested;
    for card in &cards {
        if remaining.is_zero() {
            break;
        }

        let debit = card.balance().min(remaining);
        plan.debits.push(CardDebit {
            gift_card_id: card.id.clone(),
            amount: debit,
            exhausts: debit == card.balance(),
        });
        plan.covered += debit;
        remaining -= debit;
    }

    plan
}
