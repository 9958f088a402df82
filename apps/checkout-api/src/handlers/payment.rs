//! Payment routes: start, confirm, provider webhooks.
//!
//! A provider failure is still a `200` with `ok: false`; only bad input,
//! ownership and state problems become HTTP errors.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use checkout_core::{PaymentProvider, PaymentStatus};
use checkout_engine::{ConfirmOutcome, StartOutcome, WebhookOutcome};

use crate::error::{ApiError, ApiResult};
use crate::session::Session;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    /// The provider's charge reference returned by the redirect.
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub applied: bool,
    pub status: Option<PaymentStatus>,
}

fn parse_provider(raw: &str) -> ApiResult<PaymentProvider> {
    raw.parse::<PaymentProvider>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// `POST /payment/{provider}/start {orderId}`.
pub async fn start(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
    Json(body): Json<StartRequest>,
) -> ApiResult<Json<StartOutcome>> {
    let provider = parse_provider(&provider)?;
    let outcome = state
        .engine
        .payments
        .start(&session.user_id, &body.order_id, provider)
        .await?;
    Ok(Json(outcome))
}

/// `POST /payment/{provider}/confirm {reference}`.
pub async fn confirm(
    State(state): State<AppState>,
    _session: Session,
    Path(provider): Path<String>,
    Json(body): Json<ConfirmRequest>,
) -> ApiResult<Json<ConfirmOutcome>> {
    let provider = parse_provider(&provider)?;
    let outcome = state.engine.payments.confirm(provider, &body.reference).await?;
    Ok(Json(outcome))
}

/// `POST /webhooks/{provider}`: raw body, hex HMAC in [`SIGNATURE_HEADER`].
pub async fn webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let provider = parse_provider(&provider)?;
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let outcome = state
        .engine
        .payments
        .handle_webhook(provider, &body, signature)
        .await?;

    info!(provider = %provider, outcome = ?outcome, "Webhook handled");
    Ok(Json(match outcome {
        WebhookOutcome::Applied(status) => WebhookResponse {
            applied: true,
            status: Some(status),
        },
        WebhookOutcome::Ignored => WebhookResponse {
            applied: false,
            status: None,
        },
    }))
}
