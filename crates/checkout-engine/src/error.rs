//! # Engine Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Domain       │  │     Provider            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Rejected       │  │  Timeout                │ │
//! │  │  ConfigLoad     │  │  NotFound       │  │  Http (non-2xx)         │ │
//! │  │  ConfigSave     │  │  InvalidState   │  │  Transport              │ │
//! │  │                 │  │  Forbidden      │  │  Malformed · Declined   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ProviderError is caught inside the services and turned into a         │
//! │  FAILED / REFUND_FAILED record. It only escapes from the raw gateway   │
//! │  calls and from webhook signature checks.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use checkout_core::{
    CoreError, CouponRejection, LoyaltyError, PaymentProvider, ReturnRejection, ValidationError,
};
use checkout_db::DbError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;
pub type ProviderResult<T> = Result<T, ProviderError>;

// =============================================================================
// Provider Error
// =============================================================================

/// A payment-rail call did not produce a usable answer.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{provider} did not answer within {secs}s")]
    Timeout { provider: PaymentProvider, secs: u64 },

    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: PaymentProvider,
        status: u16,
        body: String,
    },

    #[error("{provider} unreachable: {message}")]
    Transport {
        provider: PaymentProvider,
        message: String,
    },

    #[error("{provider} sent an unexpected response: {message}")]
    Malformed {
        provider: PaymentProvider,
        message: String,
    },

    #[error("{provider} declined: {reason}")]
    Declined {
        provider: PaymentProvider,
        reason: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(PaymentProvider),

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: PaymentProvider,
        operation: &'static str,
    },

    #[error("Webhook signature mismatch")]
    InvalidSignature,
}

impl ProviderError {
    /// Classifies a reqwest failure for `provider`.
    pub fn from_reqwest(provider: PaymentProvider, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider,
                secs: timeout_secs,
            }
        } else if err.is_decode() {
            ProviderError::Malformed {
                provider,
                message: err.to_string(),
            }
        } else {
            ProviderError::Transport {
                provider,
                message: err.to_string(),
            }
        }
    }
}

// =============================================================================
// Engine Error
// =============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A shopper-facing rule said no. The message is the reason to show.
    #[error("{0}")]
    Rejected(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("{0}")]
    InvalidState(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True for conditions the caller caused and can fix.
    pub fn is_client_error(&self) -> bool {
        match self {
            EngineError::Rejected(_)
            | EngineError::NotFound { .. }
            | EngineError::InvalidState(_)
            | EngineError::Forbidden(_) => true,
            EngineError::Core(_) => true,
            EngineError::Database(e) => e.is_not_found(),
            EngineError::Provider(ProviderError::InvalidSignature) => true,
            _ => false,
        }
    }
}

impl From<CouponRejection> for EngineError {
    fn from(err: CouponRejection) -> Self {
        EngineError::Rejected(err.to_string())
    }
}

impl From<LoyaltyError> for EngineError {
    fn from(err: LoyaltyError) -> Self {
        EngineError::Rejected(err.to_string())
    }
}

impl From<ReturnRejection> for EngineError {
    fn from(err: ReturnRejection) -> Self {
        EngineError::Rejected(err.to_string())
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Rejected(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(EngineError::Rejected("no".into()).is_client_error());
        assert!(EngineError::from(CouponRejection::Inactive).is_client_error());
        assert!(EngineError::from(DbError::not_found("Order", "o-1")).is_client_error());

        assert!(!EngineError::from(ProviderError::NotConfigured(PaymentProvider::Stripe)).is_client_error());
        assert!(!EngineError::InvalidConfig("x".into()).is_client_error());
    }

    #[test]
    fn test_rejection_message_is_user_copy() {
        let err = EngineError::from(LoyaltyError::NotMultipleOfBlock { block: 50 });
        assert_eq!(err.to_string(), "Points must be redeemed in blocks of 50");
    }

    #[test]
    fn test_provider_messages_name_the_rail() {
        let err = ProviderError::NotConfigured(PaymentProvider::Paypal);
        assert_eq!(err.to_string(), "paypal is not configured");
    }
}
