//! # checkout-engine: Orchestration for the Storefront Checkout
//!
//! Everything that needs both the database and the outside world: payment
//! rails, refunds, order placement, shopper notifications.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Engine Services                                  │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │ CheckoutService │   │ PaymentService  │◄──│   ReturnService     │   │
//! │  │                 │   │                 │   │                     │   │
//! │  │ coupons, quote, │   │ start, confirm, │   │ eligibility, record │   │
//! │  │ place order     │   │ webhook, resync │   │ refund dispatch     │   │
//! │  └────────┬────────┘   └────────┬────────┘   └──────────┬──────────┘   │
//! │           │                     │                       │              │
//! │           │            ┌────────▼───────────────────────▼─┐            │
//! │           │            │ GatewayRegistry                  │            │
//! │           │            │ StripeGateway · PaypalGateway ·  │            │
//! │           │            │ CodGateway                       │            │
//! │           │            └──────────────────────────────────┘            │
//! │           ▼                                                            │
//! │   checkout-db (units of work)      Notifier (fire-and-forget)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Layered engine configuration (defaults, TOML, env)
//! - [`error`] - Engine and provider error types
//! - [`gateway`] - Payment rail trait, registry, rail clients
//! - [`notify`] - Shopper notification seam
//! - [`payment`] - Charge lifecycle
//! - [`returns`] - Return requests and refunds
//! - [`checkout`] - Cart collaborators, quote, order placement
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = EngineConfig::load(None)?;
//! let db = Database::new(DbConfig::new(&config.database.path)).await?;
//! let engine = Engine::build(&config, db, Arc::new(LogNotifier))?;
//!
//! let outcome = engine.returns.request_return(&order_id, &user.user_id).await?;
//! println!("{}", outcome.message);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod config;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod payment;
pub mod returns;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use checkout::{CheckoutOptions, CheckoutService, PlacedOrder};
pub use config::{EngineConfig, ProviderSettings, ProvidersConfig};
pub use error::{EngineError, EngineResult, ProviderError, ProviderResult};
pub use gateway::{GatewayRegistry, PaymentGateway};
pub use notify::{ChannelNotifier, LogNotifier, Notification, Notifier, Template};
pub use payment::{
    ConfirmOutcome, PaymentService, StartOutcome, WebhookEvent, WebhookOutcome,
    PAYMENT_FAILED_MESSAGE,
};
pub use returns::{RefundState, ReturnOutcome, ReturnService};

use std::sync::Arc;

use checkout_db::Database;

// =============================================================================
// Engine
// =============================================================================

/// The three services wired over one database, one gateway registry and one
/// notifier.
#[derive(Clone)]
pub struct Engine {
    pub checkout: CheckoutService,
    pub payments: PaymentService,
    pub returns: ReturnService,
}

impl Engine {
    /// Builds the services from configuration. Rails are constructed from
    /// `config.providers`.
    pub fn build(config: &EngineConfig, db: Database, notifier: Arc<dyn Notifier>) -> EngineResult<Self> {
        let gateways = GatewayRegistry::from_config(&config.providers)?;
        Ok(Self::with_gateways(config, db, gateways, notifier))
    }

    /// Builds the services over an explicit registry.
    pub fn with_gateways(
        config: &EngineConfig,
        db: Database,
        gateways: GatewayRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let payments = PaymentService::new(
            db.clone(),
            gateways,
            notifier.clone(),
            config.loyalty_program(),
        );
        let returns = ReturnService::new(
            db.clone(),
            payments.clone(),
            notifier.clone(),
            config.return_policy(),
        );
        let checkout = CheckoutService::new(db, notifier, config.tax_rate(), config.loyalty_program());

        Engine {
            checkout,
            payments,
            returns,
        }
    }
}
