//! Order routes.
//!
//! Return requests answer with a flash payload for the storefront:
//! `{ status, message, redirect }`. A rejected request is a normal answer,
//! not an HTTP error.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use checkout_core::Order;
use checkout_engine::{EngineError, EngineResult, RefundState, ReturnOutcome};

use crate::error::ApiResult;
use crate::session::Session;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Flash {
    /// `success`, `warning` (return recorded, refund needs follow-up) or
    /// `error`.
    pub status: &'static str,
    pub message: String,
    pub redirect: String,
}

pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Order>> {
    let order = state
        .db
        .orders()
        .get_by_id(&order_id)
        .await
        .map_err(EngineError::from)?
        .filter(|o| o.user_id == session.user_id)
        .ok_or_else(|| EngineError::not_found("Order", &order_id))?;
    Ok(Json(order))
}

/// `POST /orders/{id}/return`.
pub async fn request_return(
    State(state): State<AppState>,
    session: Session,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Flash>> {
    let result = state
        .engine
        .returns
        .request_return(&order_id, &session.user_id)
        .await;
    flash(&order_id, result)
}

/// `POST /orders/{id}/returnItem/{itemId}`.
pub async fn request_item_return(
    State(state): State<AppState>,
    session: Session,
    Path((order_id, item_id)): Path<(String, String)>,
) -> ApiResult<Json<Flash>> {
    let result = state
        .engine
        .returns
        .request_item_return(&order_id, &item_id, &session.user_id)
        .await;
    flash(&order_id, result)
}

fn flash(order_id: &str, result: EngineResult<ReturnOutcome>) -> ApiResult<Json<Flash>> {
    let redirect = format!("/orders/{}", order_id);
    let (status, message) = match result {
        Ok(outcome) => {
            let status = match outcome.refund {
                RefundState::Failed => "warning",
                _ => "success",
            };
            (status, outcome.message)
        }
        Err(e) if e.is_client_error() => ("error", e.to_string()),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(Flash {
        status,
        message,
        redirect,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use checkout_core::{Money, OrderStatus};

    use crate::test_support::{call, test_app};

    #[tokio::test]
    async fn test_cod_order_return_flow() {
        let (app, db) = test_app().await;
        let mug = db.products().create("Mug", Money::from_cents(1250), false).await.unwrap();
        let tea = db.products().create("Tea", Money::from_cents(500), false).await.unwrap();
        call(&app, "POST", "/cart/items", Some("alice"), Some(json!({"productId": mug.id}))).await;
        call(&app, "POST", "/cart/items", Some("alice"), Some(json!({"productId": tea.id}))).await;
        let (_, placed) = call(&app, "POST", "/checkout", Some("alice"), Some(json!({}))).await;
        let order_id = placed["orderId"].as_str().unwrap().to_string();

        // before payment the order is not returnable
        let uri = format!("/orders/{}/return", order_id);
        let (_, flash) = call(&app, "POST", &uri, Some("alice"), None).await;
        assert_eq!(flash["status"], "error");

        call(&app, "POST", "/payment/cod/start", Some("alice"), Some(json!({"orderId": order_id}))).await;
        db.orders().set_status(&order_id, OrderStatus::Delivered).await.unwrap();

        let (_, order) = call(&app, "GET", &format!("/orders/{}", order_id), Some("alice"), None).await;
        let item_id = order["items"][0]["id"].as_str().unwrap().to_string();

        let item_uri = format!("/orders/{}/returnItem/{}", order_id, item_id);
        let (status, flash) = call(&app, "POST", &item_uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(flash["status"], "success");
        assert_eq!(flash["message"], "Return requested, no online payment to refund.");
        assert_eq!(flash["redirect"], format!("/orders/{}", order_id));

        let (_, flash) = call(&app, "POST", &uri, Some("alice"), None).await;
        assert_eq!(flash["status"], "error");
        assert_eq!(flash["message"], "A return has already been requested for this order");

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert_eq!(order.refund_total_cents, 1250);
    }

    #[tokio::test]
    async fn test_foreign_order_hidden() {
        let (app, db) = test_app().await;
        let mug = db.products().create("Mug", Money::from_cents(1250), false).await.unwrap();
        call(&app, "POST", "/cart/items", Some("alice"), Some(json!({"productId": mug.id}))).await;
        let (_, placed) = call(&app, "POST", "/checkout", Some("alice"), Some(json!({}))).await;
        let order_id = placed["orderId"].as_str().unwrap();

        let (status, _) = call(&app, "GET", &format!("/orders/{}", order_id), Some("mallory"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, flash) = call(&app, "POST", &format!("/orders/{}/return", order_id), Some("mallory"), None).await;
        assert_eq!(flash["status"], "error");
        assert_eq!(flash["message"], "Order not found");
    }
}
