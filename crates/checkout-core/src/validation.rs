//! # Validation Module
//!
//! Input validation for values arriving from the storefront.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: HTTP handler (deserialization, header parsing)               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - shape of codes, quantities, amounts            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Business rules (coupon windows, return windows, balances)    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite constraints (UNIQUE codes, CHECK balance >= 0)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_CODE_LEN: usize = 64;

// =============================================================================
// Codes
// =============================================================================

/// Normalizes a coupon or gift card code: trimmed, upper-cased.
///
/// Codes are compared case-insensitively everywhere, so this is the only
/// spelling that ever reaches the database.
///
/// ```rust
/// use checkout_core::validation::normalize_code;
///
/// assert_eq!(normalize_code("code", "  save10 ").unwrap(), "SAVE10");
/// assert!(normalize_code("code", "   ").is_err());
/// ```
pub fn normalize_code(field: &str, code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if code.len() > MAX_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_CODE_LEN,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(code.to_ascii_uppercase())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity being added to the cart.
///
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Clamps a requested quantity into `[1, MAX_LINE_QUANTITY]`.
#[inline]
pub fn clamp_quantity(qty: i64) -> i64 {
    qty.clamp(1, MAX_LINE_QUANTITY)
}

/// Validates a price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates an amount that must be strictly positive (top-ups, charges).
pub fn validate_positive_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a rate in basis points (0% to 100%).
pub fn validate_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

/// Validates cart size (number of distinct lines) before appending one more.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 0,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Identifiers
// =============================================================================

/// Validates a UUID string (order, item, payment ids).
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("code", "save10").unwrap(), "SAVE10");
        assert_eq!(normalize_code("code", " Gift-Card_1 ").unwrap(), "GIFT-CARD_1");

        assert!(normalize_code("code", "").is_err());
        assert!(normalize_code("code", "has space").is_err());
        assert!(normalize_code("code", &"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_clamp_quantity() {
        assert_eq!(clamp_quantity(0), 1);
        assert_eq!(clamp_quantity(-4), 1);
        assert_eq!(clamp_quantity(12), 12);
        assert_eq!(clamp_quantity(5000), 999);
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(1099).is_ok());
        assert!(validate_price_cents(-100).is_err());
    }

    #[test]
    fn test_validate_bps() {
        assert!(validate_bps("rate", 0).is_ok());
        assert!(validate_bps("rate", 800).is_ok());
        assert!(validate_bps("rate", 10001).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
    }
}
