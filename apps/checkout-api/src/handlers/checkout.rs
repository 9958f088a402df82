//! `POST /checkout`: turns the session cart into an order.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use checkout_core::pricing::CheckoutQuote;
use checkout_core::OrderStatus;
use checkout_engine::CheckoutOptions;

use crate::error::ApiResult;
use crate::session::Session;
use crate::{today, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub quote: CheckoutQuote,
}

pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
    Json(options): Json<CheckoutOptions>,
) -> ApiResult<Json<CheckoutResponse>> {
    let cart = state.cart(&session).await;
    let placed = {
        let mut cart = cart.lock().await;
        state
            .engine
            .checkout
            .place_order(&mut cart, &session.user_id, options, today())
            .await?
    };
    state.carts.remove(&session.session_id).await;

    Ok(Json(CheckoutResponse {
        order_id: placed.order.id,
        status: placed.order.status,
        quote: placed.quote,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use checkout_core::Money;

    use crate::test_support::{call, test_app, test_state};

    #[tokio::test]
    async fn test_checkout_with_gift_card() {
        let (app, db) = test_app().await;
        let mug = db.products().create("Mug", Money::from_cents(1250), false).await.unwrap();
        db.gift_cards().issue("GIFT-5", Money::from_cents(500), None).await.unwrap();

        call(&app, "POST", "/gift-cards/redeem", Some("alice"), Some(json!({"code": "gift-5"}))).await;
        call(&app, "POST", "/cart/items", Some("alice"), Some(json!({"productId": mug.id}))).await;

        let (status, body) = call(
            &app,
            "POST",
            "/checkout",
            Some("alice"),
            Some(json!({"useGiftCards": true, "loyaltyPoints": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "PENDING");
        // 1250 + 100 tax, less the 500 card
        assert_eq!(body["quote"]["giftCardApplied"], 500);
        assert_eq!(body["quote"]["amountDue"], 850);

        let (_, cart) = call(&app, "GET", "/cart", Some("alice"), None).await;
        assert_eq!(cart["cartCount"], 0);
    }

    #[tokio::test]
    async fn test_checkout_releases_session_cart() {
        let (state, db) = test_state().await;
        let app = crate::router(state.clone());
        let mug = db.products().create("Mug", Money::from_cents(1250), false).await.unwrap();

        call(&app, "POST", "/cart/items", Some("alice"), Some(json!({"productId": mug.id}))).await;
        assert_eq!(state.carts.len().await, 1);

        let (status, _) = call(&app, "POST", "/checkout", Some("alice"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.carts.is_empty().await);

        // a failed checkout keeps the cart
        call(&app, "POST", "/cart/items", Some("bob"), Some(json!({"productId": mug.id}))).await;
        let (status, _) = call(&app, "POST", "/checkout", Some("bob"), Some(json!({"loyaltyPoints": 75}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.carts.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let (app, _db) = test_app().await;
        let (status, body) = call(&app, "POST", "/checkout", Some("alice"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cart is empty");
    }
}
