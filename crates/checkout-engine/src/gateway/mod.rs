//! # Payment Gateways
//!
//! One capability interface per payment rail, dispatched by provider tag.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      PaymentGateway (trait)                             │
//! │                                                                         │
//! │   start_charge(request)      ──► ChargeHandle { charge_id, action }     │
//! │   confirm_charge(charge_id)  ──► ChargeOutcome                          │
//! │   refund(txn_id, amount)     ──► RefundReceipt { refund_id }            │
//! │                                                                         │
//! │   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐               │
//! │   │ StripeGateway│   │ PaypalGateway│   │  CodGateway  │               │
//! │   │ intents API  │   │ orders API   │   │ no network   │               │
//! │   └──────────────┘   └──────────────┘   └──────────────┘               │
//! │                                                                         │
//! │   Every call returns a Result; nothing panics or throws across here.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cod;
mod paypal;
mod stripe;

pub use cod::CodGateway;
pub use paypal::PaypalGateway;
pub use stripe::StripeGateway;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::info;

use checkout_core::{Money, PaymentProvider};

use crate::config::ProvidersConfig;
use crate::error::{EngineResult, ProviderError, ProviderResult};

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Gateway Contract
// =============================================================================

/// What to charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub order_id: String,
    pub payment_id: String,
    pub amount: Money,
    pub currency: String,
}

/// A started charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeHandle {
    /// Provider's id for the charge session; callbacks refer to it.
    pub charge_id: String,
    /// Redirect URL or client secret handed back to the shopper.
    pub redirect_or_client_secret: String,
}

/// Provider's view of a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeeded { transaction_id: String },
    /// The shopper has not finished yet.
    Pending,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    pub refund_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    async fn start_charge(&self, request: &ChargeRequest) -> ProviderResult<ChargeHandle>;

    async fn confirm_charge(&self, charge_id: &str) -> ProviderResult<ChargeOutcome>;

    /// Refunds `amount` of the captured transaction `transaction_id`.
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Money,
        reason: &str,
    ) -> ProviderResult<RefundReceipt>;

    /// HMAC key for this rail's webhooks, if configured.
    fn webhook_secret(&self) -> Option<&str> {
        None
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Gateways keyed by provider tag.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the enabled rails from configuration. COD is always present.
    pub fn from_config(config: &ProvidersConfig) -> EngineResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(CodGateway));

        if config.stripe.enabled {
            registry.register(Arc::new(StripeGateway::new(&config.stripe)?));
        }
        if config.paypal.enabled {
            registry.register(Arc::new(PaypalGateway::new(&config.paypal)?));
        }

        info!(providers = ?registry.providers(), "Payment gateways ready");
        Ok(registry)
    }

    /// Adds or replaces the gateway for its provider.
    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.provider(), gateway);
    }

    pub fn get(&self, provider: PaymentProvider) -> ProviderResult<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or(ProviderError::NotConfigured(provider))
    }

    pub fn providers(&self) -> Vec<PaymentProvider> {
        let mut providers: Vec<_> = self.gateways.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

// =============================================================================
// Webhook Signatures
// =============================================================================

/// Checks a hex HMAC-SHA256 of the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> ProviderResult<()> {
    let expected = hex::decode(signature_hex.trim()).map_err(|_| ProviderError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ProviderError::InvalidSignature)?;
    mac.update(body);

    // verify_slice compares in constant time
    mac.verify_slice(&expected)
        .map_err(|_| ProviderError::InvalidSignature)
}

/// Signs a body the way [`verify_signature`] expects.
pub fn sign(secret: &str, body: &[u8]) -> ProviderResult<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ProviderError::InvalidSignature)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Trims a trailing slash so paths can be appended with `format!`.
pub(crate) fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Reads a non-2xx body into a [`ProviderError::Http`].
pub(crate) async fn http_error(provider: PaymentProvider, response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProviderError::Http {
        provider,
        status,
        body,
    }
}
