//! Wallet rail over the Orders v2 REST API.
//!
//! ```text
//!   token          POST /v1/oauth2/token                     (client credentials)
//!   start_charge   POST /v2/checkout/orders                  ──► id + approve link
//!   confirm_charge GET  /v2/checkout/orders/{id}
//!                  POST /v2/checkout/orders/{id}/capture     (once APPROVED)
//!   refund         POST /v2/payments/captures/{id}/refund    ──► refund id
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use checkout_core::{Money, PaymentProvider, CURRENCY};

use super::{base_url, http_error, ChargeHandle, ChargeOutcome, ChargeRequest, PaymentGateway, RefundReceipt};
use crate::config::ProviderSettings;
use crate::error::{EngineError, EngineResult, ProviderError, ProviderResult};

const PROVIDER: PaymentProvider = PaymentProvider::Paypal;

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct WalletOrder {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct WalletRefund {
    id: String,
    status: String,
}

impl WalletOrder {
    fn approve_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.as_str())
    }

    fn completed_capture(&self) -> Option<&Capture> {
        self.purchase_units
            .iter()
            .filter_map(|u| u.payments.as_ref())
            .flat_map(|p| p.captures.iter())
            .find(|c| c.status == "COMPLETED")
    }
}

#[derive(Clone)]
pub struct PaypalGateway {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: String,
    webhook_secret: Option<String>,
    timeout_secs: u64,
}

impl PaypalGateway {
    pub fn new(settings: &ProviderSettings) -> EngineResult<Self> {
        let missing = |field: &str| EngineError::InvalidConfig(format!("providers.paypal.{} is missing", field));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| EngineError::InvalidConfig(format!("paypal http client: {}", e)))?;

        Ok(PaypalGateway {
            client,
            base_url: base_url(&settings.base_url),
            client_id: settings.client_id.clone().ok_or_else(|| missing("client_id"))?,
            secret: settings.secret_key.clone().ok_or_else(|| missing("secret_key"))?,
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

    async fn access_token(&self) -> ProviderResult<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let token: AccessToken = self.parse(response).await?;
        Ok(token.access_token)
    }

    async fn capture(&self, token: &str, order_id: &str) -> ProviderResult<WalletOrder> {
        let response = self
            .client
            .post(format!("{}/v2/checkout/orders/{}/capture", self.base_url, order_id))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("capture-{}", order_id))
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        self.parse(response).await
    }
}

#[async_trait]
impl PaymentGateway for PaypalGateway {
    fn provider(&self) -> PaymentProvider {
        PROVIDER
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = %request.amount))]
    async fn start_charge(&self, request: &ChargeRequest) -> ProviderResult<ChargeHandle> {
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.order_id,
                "custom_id": request.payment_id,
                "amount": {
                    "currency_code": request.currency,
                    "value": request.amount.to_decimal_string(),
                }
            }]
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(&token)
            .header("PayPal-Request-Id", &request.payment_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let order: WalletOrder = self.parse(response).await?;
        let approve = order
            .approve_link()
            .ok_or_else(|| ProviderError::Malformed {
                provider: PROVIDER,
                message: "order without approve link".into(),
            })?
            .to_string();

        info!(charge_id = %order.id, "Wallet order created");
        Ok(ChargeHandle {
            charge_id: order.id,
            redirect_or_client_secret: approve,
        })
    }

    #[instrument(skip(self))]
    async fn confirm_charge(&self, charge_id: &str) -> ProviderResult<ChargeOutcome> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!("{}/v2/checkout/orders/{}", self.base_url, charge_id))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let mut order: WalletOrder = self.parse(response).await?;
        debug!(status = %order.status, "Wallet order status");

        if order.status == "APPROVED" {
            order = self.capture(&token, charge_id).await?;
        }

        let outcome = match order.status.as_str() {
            "COMPLETED" => match order.completed_capture() {
                Some(capture) => ChargeOutcome::Succeeded {
                    transaction_id: capture.id.clone(),
                },
                None => ChargeOutcome::Failed {
                    reason: "order completed without a completed capture".into(),
                },
            },
            "VOIDED" => ChargeOutcome::Failed {
                reason: "wallet order voided".into(),
            },
            _ => ChargeOutcome::Pending,
        };
        Ok(outcome)
    }

    #[instrument(skip(self, reason), fields(amount = %amount))]
    async fn refund(&self, transaction_id: &str, amount: Money, reason: &str) -> ProviderResult<RefundReceipt> {
        let token = self.access_token().await?;

        let body = json!({
            "amount": {
                "currency_code": CURRENCY,
                "value": amount.to_decimal_string(),
            },
            "note_to_payer": reason,
        });

        let response = self
            .client
            .post(format!("{}/v2/payments/captures/{}/refund", self.base_url, transaction_id))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let refund: WalletRefund = self.parse(response).await?;
        match refund.status.as_str() {
            "FAILED" | "CANCELLED" => {
                warn!(refund_id = %refund.id, status = %refund.status, "Refund rejected");
                Err(ProviderError::Declined {
                    provider: PROVIDER,
                    reason: refund.status,
                })
            }
            _ => Ok(RefundReceipt { refund_id: refund.id }),
        }
    }

    fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_client_id() {
        let settings = ProviderSettings {
            enabled: true,
            base_url: "https://paypal.test".into(),
            client_id: None,
            secret_key: Some("secret".into()),
            webhook_secret: None,
            timeout_secs: 5,
        };
        assert!(PaypalGateway::new(&settings).is_err());
    }

    #[test]
    fn test_order_decoding() {
        let order: WalletOrder = serde_json::from_str(
            r#"{
                "id": "5O190127TN364715T",
                "status": "COMPLETED",
                "links": [{"href": "https://paypal.test/approve", "rel": "approve", "method": "GET"}],
                "purchase_units": [{
                    "reference_id": "o-1",
                    "payments": {"captures": [
                        {"id": "CAP-1", "status": "DECLINED"},
                        {"id": "CAP-2", "status": "COMPLETED"}
                    ]}
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(order.approve_link(), Some("https://paypal.test/approve"));
        assert_eq!(order.completed_capture().map(|c| c.id.as_str()), Some("CAP-2"));
    }
}
