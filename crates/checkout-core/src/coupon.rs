//! # Coupon Rules
//!
//! Pure eligibility and discount computation for a single coupon.
//!
//! Lookup (unknown code) and one-time-use (already redeemed) need storage and
//! live in the engine; everything that can be decided from the coupon row,
//! the cart subtotal and today's date is decided here.

use chrono::NaiveDate;

use crate::error::CouponRejection;
use crate::money::Money;
use crate::types::{Coupon, CouponKind};

/// Checks whether `coupon` may be applied to a cart with `subtotal` on `today`.
///
/// ## Rejection Order
/// inactive → not yet started → expired → below minimum subtotal
///
/// Start and expiry dates are inclusive.
pub fn check_coupon(
    coupon: &Coupon,
    subtotal: Money,
    today: NaiveDate,
) -> Result<(), CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }

    if let Some(starts_on) = coupon.starts_on {
        if today < starts_on {
            return Err(CouponRejection::NotStarted { starts_on });
        }
    }

    if let Some(expires_on) = coupon.expires_on {
        if today > expires_on {
            return Err(CouponRejection::Expired { expires_on });
        }
    }

    if subtotal < coupon.min_subtotal() {
        return Err(CouponRejection::BelowMinimum {
            minimum: coupon.min_subtotal(),
        });
    }

    Ok(())
}

/// The discount `coupon` grants on `subtotal`, always within `[0, subtotal]`.
///
/// ```rust
/// use checkout_core::coupon::coupon_discount;
/// use checkout_core::{Coupon, CouponKind, Money};
///
/// let flat = Coupon {
///     id: "c1".into(),
///     code: "FIVE".into(),
///     kind: CouponKind::FlatAmount,
///     value: 500,
///     min_subtotal_cents: 0,
///     starts_on: None,
///     expires_on: None,
///     is_active: true,
/// };
/// // A $5 coupon on a $3 cart discounts $3, never more.
/// assert_eq!(coupon_discount(&flat, Money::from_cents(300)).cents(), 300);
/// ```
pub fn coupon_discount(coupon: &Coupon, subtotal: Money) -> Money {
    if !subtotal.is_positive() {
        return Money::zero();
    }

    let raw = match coupon.kind {
        CouponKind::Percent => {
            let bps = coupon.value.clamp(0, 10_000) as u32;
            subtotal.percent_bps(bps)
        }
        CouponKind::FlatAmount => Money::from_cents(coupon.value.max(0)),
    };

    raw.min(subtotal)
}
