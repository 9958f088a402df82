//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every amount is an exact count of cents. Rates are basis points.    │
//! │    Scaling by a rate rounds half-up exactly once, at a known place.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use checkout_core::money::Money;
//!
//! let price = Money::from_cents(1250); // $12.50
//! let line = price.multiply_quantity(2); // $25.00
//! assert_eq!(line.percent_bps(1000).cents(), 250); // 10% of $25.00
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// ## Where Money Flows
/// ```text
/// Product.price ──► CartLine.unit_price ──► CartLine.line_total
///                                               │
///                        Cart.subtotal ◄────────┘
///                             │
///            coupon discount ─┤──► taxable base ──► tax ──► grand total
///                                                              │
///              loyalty discount + gift card cover ─────────────┤
///                                                              ▼
///                                                   Payment.amount (due)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use checkout_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from dollars and cents.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -$5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-dollar portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Subtracts, flooring the result at zero.
    ///
    /// ```rust
    /// use checkout_core::money::Money;
    ///
    /// let left = Money::from_cents(500).saturating_sub_floor(Money::from_cents(800));
    /// assert!(left.is_zero());
    /// ```
    #[inline]
    pub fn saturating_sub_floor(self, other: Money) -> Money {
        if other.0 >= self.0 {
            Money::zero()
        } else {
            Money(self.0 - other.0)
        }
    }

    /// Scales the amount by a rate in basis points, rounding half-up.
    ///
    /// ## Rounding
    /// Integer math: `(amount * bps + 5000) / 10000`. Ties round away from
    /// zero, so negative amounts mirror positive ones.
    ///
    /// ```rust
    /// use checkout_core::money::Money;
    ///
    /// // 10% of $30.00
    /// assert_eq!(Money::from_cents(3000).percent_bps(1000).cents(), 300);
    /// // 8% of $27.00
    /// assert_eq!(Money::from_cents(2700).percent_bps(800).cents(), 216);
    /// ```
    pub fn percent_bps(&self, bps: u32) -> Money {
        let raw = self.0.unsigned_abs() as i128 * bps as i128;
        let rounded = ((raw + 5000) / 10000) as i64;
        if self.0 < 0 {
            Money(-rounded)
        } else {
            Money(rounded)
        }
    }

    /// Calculates tax at the given rate, rounded half-up to the cent.
    ///
    /// ```rust
    /// use checkout_core::money::Money;
    /// use checkout_core::types::TaxRate;
    ///
    /// let base = Money::from_cents(2700); // $27.00
    /// assert_eq!(base.calculate_tax(TaxRate::from_bps(800)).cents(), 216);
    /// ```
    #[inline]
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.percent_bps(rate.bps())
    }

    /// Multiplies a unit price by a quantity. Exact in cents.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Renders the amount as a plain decimal string (`"12.50"`), the form
    /// wallet-style provider APIs expect.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses `"12"`, `"12.5"`, `"12.50"` or `"$12.50"` into cents.
///
/// More than two fractional digits is rejected rather than rounded: money
/// entered by an administrator must already be exact.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim().trim_start_matches('$');
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected digits before the decimal point"));
        }
        if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("at most two decimal places"));
        }

        let major: i64 = whole
            .parse()
            .map_err(|_| invalid("amount is too large"))?;
        let minor: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid("bad cents"))? * 10,
            _ => frac.parse::<i64>().map_err(|_| invalid("bad cents"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(Money::from_cents(1250).to_decimal_string(), "12.50");
    }

    #[test]
    fn test_percent_rounds_half_up() {
        // 8% of $0.25 = 2 cents exactly; 8% of $0.31 = 2.48 -> 2
        assert_eq!(Money::from_cents(25).percent_bps(800).cents(), 2);
        assert_eq!(Money::from_cents(31).percent_bps(800).cents(), 2);
        // 0.5% of $1.00 = half a cent -> 1
        assert_eq!(Money::from_cents(100).percent_bps(50).cents(), 1);
        assert_eq!(Money::from_cents(-100).percent_bps(50).cents(), -1);
    }

    #[test]
    fn test_tax_on_scenario_base() {
        let base = Money::from_cents(2700);
        assert_eq!(base.calculate_tax(TaxRate::from_bps(800)).cents(), 216);
    }

    #[test]
    fn test_saturating_sub_floor() {
        let a = Money::from_cents(1000);
        assert_eq!(a.saturating_sub_floor(Money::from_cents(400)).cents(), 600);
        assert!(a.saturating_sub_floor(Money::from_cents(1500)).is_zero());
    }

    #[test]
    fn test_parse() {
        assert_eq!("12.50".parse::<Money>().unwrap().cents(), 1250);
        assert_eq!("$7".parse::<Money>().unwrap().cents(), 700);
        assert_eq!("0.5".parse::<Money>().unwrap().cents(), 50);
        assert_eq!("-3.25".parse::<Money>().unwrap().cents(), -325);
        assert!("1.005".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money::from_cents(100), Money::from_cents(250)]
            .iter()
            .sum();
        assert_eq!(total.cents(), 350);
    }
}
