//! # Loyalty Program
//!
//! Conversion between money and points.
//!
//! ```text
//!   EARN:   amount paid ──► floor(amount / $10) points
//!   REDEEM: points (≥ 50, multiple of 50) ──► points / 50 dollars
//! ```
//!
//! Balances and the ledger live in `checkout-db`; this module only decides
//! how many points an amount is worth and whether a redemption is allowed.

use serde::{Deserialize, Serialize};

use crate::error::LoyaltyError;
use crate::money::Money;

/// Program parameters. Defaults match the storefront's published rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyProgram {
    /// Cents of paid spend that earn one point ($10.00).
    pub earn_unit_cents: i64,
    /// Points that redeem for one dollar.
    pub points_per_dollar: i64,
    /// Redemptions must be a positive multiple of this.
    pub block_size: i64,
}

impl Default for LoyaltyProgram {
    fn default() -> Self {
        LoyaltyProgram {
            earn_unit_cents: 1000,
            points_per_dollar: 50,
            block_size: 50,
        }
    }
}

impl LoyaltyProgram {
    /// Points earned on a successfully paid amount. Never negative.
    ///
    /// ```rust
    /// use checkout_core::loyalty::LoyaltyProgram;
    /// use checkout_core::Money;
    ///
    /// let program = LoyaltyProgram::default();
    /// assert_eq!(program.earn_points(Money::from_cents(2999)), 2);
    /// assert_eq!(program.earn_points(Money::from_cents(999)), 0);
    /// ```
    pub fn earn_points(&self, amount_paid: Money) -> i64 {
        if !amount_paid.is_positive() || self.earn_unit_cents <= 0 {
            return 0;
        }
        amount_paid.cents() / self.earn_unit_cents
    }

    /// Checks a redemption request against the block rule and the balance.
    pub fn validate_redemption(&self, points: i64, balance: i64) -> Result<(), LoyaltyError> {
        if points < self.block_size {
            return Err(LoyaltyError::BelowMinimum {
                minimum: self.block_size,
            });
        }

        if self.block_size > 0 && points % self.block_size != 0 {
            return Err(LoyaltyError::NotMultipleOfBlock {
                block: self.block_size,
            });
        }

        if points > balance {
            return Err(LoyaltyError::InsufficientPoints {
                available: balance,
                requested: points,
            });
        }

        Ok(())
    }

    /// Checks a redemption for an order owing `total`. The points must buy no
    /// more discount than the order is worth, so every redeemed point is
    /// honoured in full.
    ///
    /// ```rust
    /// use checkout_core::loyalty::LoyaltyProgram;
    /// use checkout_core::{LoyaltyError, Money};
    ///
    /// let program = LoyaltyProgram::default();
    /// assert!(program.validate_order_redemption(50, 500, Money::from_cents(108)).is_ok());
    /// assert_eq!(
    ///     program.validate_order_redemption(500, 500, Money::from_cents(108)),
    ///     Err(LoyaltyError::ExceedsOrderTotal { max_points: 50 })
    /// );
    /// ```
    pub fn validate_order_redemption(&self, points: i64, balance: i64, total: Money) -> Result<(), LoyaltyError> {
        self.validate_redemption(points, balance)?;

        if self.discount_for(points) > total {
            return Err(LoyaltyError::ExceedsOrderTotal {
                max_points: self.max_redeemable(total),
            });
        }
        Ok(())
    }

    /// Largest whole number of blocks whose value does not exceed `total`.
    pub fn max_redeemable(&self, total: Money) -> i64 {
        let block_value = self.discount_for(self.block_size);
        if self.block_size <= 0 || !block_value.is_positive() || !total.is_positive() {
            return 0;
        }

        let mut blocks = total.cents() / block_value.cents();
        while self.discount_for((blocks + 1) * self.block_size) <= total {
            blocks += 1;
        }
        while blocks > 0 && self.discount_for(blocks * self.block_size) > total {
            blocks -= 1;
        }
        blocks * self.block_size
    }

    /// Dollar value of `points`, rounded half-up to the cent.
    pub fn discount_for(&self, points: i64) -> Money {
        if points <= 0 || self.points_per_dollar <= 0 {
            return Money::zero();
        }
        let cents = (points as i128 * 100 * 2 + self.points_per_dollar as i128)
            / (2 * self.points_per_dollar as i128);
        Money::from_cents(cents as i64)
    }
}
