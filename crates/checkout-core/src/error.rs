//! # Error Types
//!
//! Domain-specific error types for checkout-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  checkout-core errors (this file)                                      │
//! │  ├── CoreError         - General domain errors (wraps the below)       │
//! │  ├── ValidationError   - Input validation failures                     │
//! │  ├── CouponRejection   - Why a coupon was not applied                  │
//! │  ├── LoyaltyError      - Why a point redemption was refused            │
//! │  └── ReturnRejection   - Why a return request was refused              │
//! │                                                                         │
//! │  checkout-db      └── DbError       - Database failures                │
//! │  checkout-engine  └── EngineError   - Provider / orchestration         │
//! │  checkout-api     └── ApiError      - What HTTP clients see            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rejection's `Display` is the human-readable reason shown to the
//! shopper, so the messages below are user-facing copy.

use chrono::NaiveDate;
use thiserror::Error;

use crate::money::Money;
use crate::types::OrderStatus;

// =============================================================================
// Core Error
// =============================================================================

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    #[error("Product {0} is not in the cart")]
    ProductNotInCart(String),

    #[error("Product {0} is not available")]
    ProductUnavailable(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("{0}")]
    Coupon(#[from] CouponRejection),

    #[error("{0}")]
    Loyalty(#[from] LoyaltyError),

    #[error("{0}")]
    Return(#[from] ReturnRejection),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A money invariant would have been broken. Callers treat this as a bug,
    /// never as a shopper-facing condition.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

// =============================================================================
// Validation Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Coupon Rejection
// =============================================================================

/// Why a coupon was not applied. The cart is always left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("Coupons cannot be used on orders containing gift cards")]
    GiftCardInCart,

    #[error("Please enter a coupon code")]
    EmptyCode,

    #[error("Coupon code not recognised")]
    UnknownCode,

    #[error("This coupon is no longer active")]
    Inactive,

    #[error("This coupon is not valid until {starts_on}")]
    NotStarted { starts_on: NaiveDate },

    #[error("This coupon expired on {expires_on}")]
    Expired { expires_on: NaiveDate },

    #[error("Spend at least {minimum} to use this coupon")]
    BelowMinimum { minimum: Money },

    #[error("You have already used this coupon")]
    AlreadyUsed,
}

// =============================================================================
// Loyalty Error
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoyaltyError {
    #[error("Redeem at least {minimum} points")]
    BelowMinimum { minimum: i64 },

    #[error("Points must be redeemed in blocks of {block}")]
    NotMultipleOfBlock { block: i64 },

    #[error("Not enough points: {available} available, {requested} requested")]
    InsufficientPoints { available: i64, requested: i64 },

    #[error("At most {max_points} points can be redeemed on this order")]
    ExceedsOrderTotal { max_points: i64 },
}

// =============================================================================
// Return Rejection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnRejection {
    #[error("Order not found")]
    NotOwner,

    #[error("Orders that are {status} cannot be returned")]
    IneligibleStatus { status: OrderStatus },

    #[error("A return has already been requested for this order")]
    AlreadyRequested,

    #[error("This order has already been returned")]
    AlreadyReturned,

    #[error("The {days}-day return window has closed")]
    WindowElapsed { days: i64 },

    #[error("Item not found on this order")]
    ItemNotFound,

    #[error("This item has already been returned")]
    ItemAlreadyReturned,

    #[error("A return is already pending for this item")]
    ItemReturnPending,

    #[error("This item has no refundable value")]
    ZeroValueItem,

    #[error("There is nothing left to return on this order")]
    NothingToReturn,
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_rejection_messages() {
        let err = CouponRejection::BelowMinimum {
            minimum: Money::from_cents(5000),
        };
        assert_eq!(err.to_string(), "Spend at least $50.00 to use this coupon");
    }

    #[test]
    fn test_return_rejection_messages() {
        let err = ReturnRejection::IneligibleStatus {
            status: OrderStatus::Pending,
        };
        assert_eq!(err.to_string(), "Orders that are pending cannot be returned");
    }

    #[test]
    fn test_rejections_convert_to_core_error() {
        let core_err: CoreError = CouponRejection::UnknownCode.into();
        assert!(matches!(core_err, CoreError::Coupon(CouponRejection::UnknownCode)));
        assert_eq!(core_err.to_string(), "Coupon code not recognised");
    }
}
