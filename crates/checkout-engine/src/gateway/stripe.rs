//! Card rail over the PaymentIntents REST API.
//!
//! ```text
//!   start_charge   POST /v1/payment_intents          ──► id + client_secret
//!   confirm_charge GET  /v1/payment_intents/{id}     ──► status, latest_charge
//!   refund         POST /v1/refunds                  ──► refund id
//! ```
//!
//! Form-encoded requests, basic auth with the secret key, and the payment id
//! as idempotency key so a retried start never opens a second intent.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use checkout_core::{Money, PaymentProvider};

use super::{base_url, http_error, ChargeHandle, ChargeOutcome, ChargeRequest, PaymentGateway, RefundReceipt};
use crate::config::ProviderSettings;
use crate::error::{EngineError, EngineResult, ProviderError, ProviderResult};

const PROVIDER: PaymentProvider = PaymentProvider::Stripe;

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    latest_charge: Option<String>,
    #[serde(default)]
    last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Deserialize)]
struct PaymentError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: String,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    webhook_secret: Option<String>,
    timeout_secs: u64,
}

impl StripeGateway {
    pub fn new(settings: &ProviderSettings) -> EngineResult<Self> {
        let secret_key = settings
            .secret_key
            .clone()
            .ok_or_else(|| EngineError::InvalidConfig("providers.stripe.secret_key is missing".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| EngineError::InvalidConfig(format!("stripe http client: {}", e)))?;

        Ok(StripeGateway {
            client,
            base_url: base_url(&settings.base_url),
            secret_key,
            webhook_secret: settings.webhook_secret.clone(),
            timeout_secs: settings.timeout_secs,
        })
    }

    fn transport(&self, err: reqwest::Error) -> ProviderError {
        ProviderError::from_reqwest(PROVIDER, self.timeout_secs, err)
    }

    async fn parse<T: serde::de::DeserializeOwned>(&self, response: reqwest::Response) -> ProviderResult<T> {
        if !response.status().is_success() {
            return Err(http_error(PROVIDER, response).await);
        }
        response.json::<T>().await.map_err(|e| self.transport(e))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> PaymentProvider {
        PROVIDER
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = %request.amount))]
    async fn start_charge(&self, request: &ChargeRequest) -> ProviderResult<ChargeHandle> {
        let params = [
            ("amount", request.amount.cents().to_string()),
            ("currency", request.currency.to_ascii_lowercase()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[order_id]", request.order_id.clone()),
            ("metadata[payment_id]", request.payment_id.clone()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .basic_auth(&self.secret_key, Some(""))
            .header("Idempotency-Key", &request.payment_id)
            .form(&params)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let intent: PaymentIntent = self.parse(response).await?;
        let client_secret = intent.client_secret.ok_or_else(|| ProviderError::Malformed {
            provider: PROVIDER,
            message: "payment intent without client_secret".into(),
        })?;

        info!(charge_id = %intent.id, "Payment intent created");
        Ok(ChargeHandle {
            charge_id: intent.id,
            redirect_or_client_secret: client_secret,
        })
    }

    #[instrument(skip(self))]
    async fn confirm_charge(&self, charge_id: &str) -> ProviderResult<ChargeOutcome> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.base_url, charge_id))
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let intent: PaymentIntent = self.parse(response).await?;
        debug!(status = %intent.status, "Payment intent status");

        let outcome = match intent.status.as_str() {
            "succeeded" => ChargeOutcome::Succeeded {
                transaction_id: intent.latest_charge.unwrap_or(intent.id),
            },
            "canceled" => ChargeOutcome::Failed {
                reason: "payment intent canceled".into(),
            },
            _ => match intent.last_payment_error {
                Some(err) => ChargeOutcome::Failed {
                    reason: err.message.unwrap_or_else(|| "card declined".into()),
                },
                None => ChargeOutcome::Pending,
            },
        };
        Ok(outcome)
    }

    #[instrument(skip(self, reason), fields(amount = %amount))]
    async fn refund(&self, transaction_id: &str, amount: Money, reason: &str) -> ProviderResult<RefundReceipt> {
        let target = if transaction_id.starts_with("pi_") {
            "payment_intent"
        } else {
            "charge"
        };
        let params = [
            (target, transaction_id.to_string()),
            ("amount", amount.cents().to_string()),
            ("reason", "requested_by_customer".to_string()),
            ("metadata[note]", reason.to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/refunds", self.base_url))
            .basic_auth(&self.secret_key, Some(""))
            .form(&params)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let refund: StripeRefund = self.parse(response).await?;
        match refund.status.as_str() {
            "failed" | "canceled" => {
                warn!(refund_id = %refund.id, status = %refund.status, "Refund rejected");
                Err(ProviderError::Declined {
                    provider: PROVIDER,
                    reason: refund.failure_reason.unwrap_or(refund.status),
                })
            }
            _ => Ok(RefundReceipt { refund_id: refund.id }),
        }
    }

    fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }
}
