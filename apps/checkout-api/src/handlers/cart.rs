//! Cart routes.
//!
//! Coupon routes answer with a status/message pair plus the totals, so a
//! rejected code is a normal `200` carrying `status: "error"`.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use checkout_core::cart::{Cart, CartLine};
use checkout_core::pricing::CartTotals;
use checkout_core::Money;
use checkout_engine::EngineError;

use crate::error::ApiResult;
use crate::session::Session;
use crate::{today, AppState};

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: String,
    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CouponRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineView {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
    pub is_gift_card: bool,
}

impl From<&CartLine> for LineView {
    fn from(line: &CartLine) -> Self {
        LineView {
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            line_total: line.line_total(),
            is_gift_card: line.is_gift_card,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<LineView>,
    pub coupon_code: Option<String>,
    #[serde(flatten)]
    pub totals: TotalsView,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        CartView {
            lines: cart.lines().iter().map(LineView::from).collect(),
            coupon_code: cart.coupon_code().map(str::to_string),
            totals: TotalsView::from(cart.totals()),
        }
    }
}

/// Money fields are integer cents.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsView {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub grand_total: Money,
    pub cart_count: i64,
}

impl From<CartTotals> for TotalsView {
    fn from(totals: CartTotals) -> Self {
        TotalsView {
            subtotal: totals.subtotal,
            discount: totals.discount,
            tax: totals.tax,
            grand_total: totals.grand_total,
            cart_count: totals.total_quantity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CouponResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(flatten)]
    pub totals: TotalsView,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn show(State(state): State<AppState>, session: Session) -> Json<CartView> {
    let cart = state.cart(&session).await;
    let cart = cart.lock().await;
    Json(CartView::from(&*cart))
}

pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<AddItemRequest>,
) -> ApiResult<Json<CartView>> {
    let cart = state.cart(&session).await;
    let mut cart = cart.lock().await;

    state
        .engine
        .checkout
        .add_item(&mut cart, &body.product_id, body.quantity)
        .await?;
    Ok(Json(CartView::from(&*cart)))
}

pub async fn set_quantity(
    State(state): State<AppState>,
    session: Session,
    Path(product_id): Path<String>,
    Json(body): Json<QuantityRequest>,
) -> ApiResult<Json<CartView>> {
    let cart = state.cart(&session).await;
    let mut cart = cart.lock().await;

    cart.set_quantity(&product_id, body.quantity)
        .map_err(EngineError::from)?;
    Ok(Json(CartView::from(&*cart)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    Path(product_id): Path<String>,
) -> ApiResult<Json<CartView>> {
    let cart = state.cart(&session).await;
    let mut cart = cart.lock().await;

    cart.remove(&product_id).map_err(EngineError::from)?;
    Ok(Json(CartView::from(&*cart)))
}

/// `POST /cart/coupon {code}`.
pub async fn apply_coupon(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CouponRequest>,
) -> ApiResult<Json<CouponResponse>> {
    let cart = state.cart(&session).await;
    let mut cart = cart.lock().await;

    let result = state
        .engine
        .checkout
        .apply_coupon(&mut cart, &session.user_id, &body.code, today())
        .await;

    let (status, message) = match result {
        Ok(_) => ("ok", "Coupon applied".to_string()),
        Err(e) if e.is_client_error() => ("error", e.to_string()),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(CouponResponse {
        status,
        message,
        totals: TotalsView::from(cart.totals()),
    }))
}

pub async fn remove_coupon(State(state): State<AppState>, session: Session) -> Json<CouponResponse> {
    let cart = state.cart(&session).await;
    let mut cart = cart.lock().await;

    let totals = state.engine.checkout.remove_coupon(&mut cart);
    Json(CouponResponse {
        status: "ok",
        message: "Coupon removed".to_string(),
        totals: TotalsView::from(totals),
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use checkout_core::{Coupon, CouponKind, Money};

    use crate::test_support::{call, test_app};

    #[tokio::test]
    async fn test_cart_and_coupon_scenario() {
        let (app, db) = test_app().await;
        let mug = db.products().create("Mug", Money::from_cents(1250), false).await.unwrap();
        let tea = db.products().create("Tea", Money::from_cents(500), false).await.unwrap();
        db.coupons()
            .insert(&Coupon {
                id: "c-10".into(),
                code: "SAVE10".into(),
                kind: CouponKind::Percent,
                value: 1000,
                min_subtotal_cents: 0,
                starts_on: None,
                expires_on: None,
                is_active: true,
            })
            .await
            .unwrap();

        call(&app, "POST", "/cart/items", Some("alice"), Some(json!({"productId": mug.id, "quantity": 2}))).await;
        let (status, cart) =
            call(&app, "POST", "/cart/items", Some("alice"), Some(json!({"productId": tea.id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["subtotal"], 3000);
        assert_eq!(cart["cartCount"], 3);

        let (status, body) = call(&app, "POST", "/cart/coupon", Some("alice"), Some(json!({"code": "nope"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Coupon code not recognised");
        assert_eq!(body["discount"], 0);

        let (_, body) = call(&app, "POST", "/cart/coupon", Some("alice"), Some(json!({"code": "save10"}))).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["discount"], 300);
        assert_eq!(body["tax"], 216);
        assert_eq!(body["grandTotal"], 2916);

        let (_, body) = call(&app, "DELETE", "/cart/coupon", Some("alice"), None).await;
        assert_eq!(body["grandTotal"], 3240);

        // carts are per session
        let (_, other) = call(&app, "GET", "/cart", Some("bob"), None).await;
        assert_eq!(other["cartCount"], 0);
    }

    #[tokio::test]
    async fn test_quantity_and_removal() {
        let (app, db) = test_app().await;
        let mug = db.products().create("Mug", Money::from_cents(1250), false).await.unwrap();
        call(&app, "POST", "/cart/items", Some("alice"), Some(json!({"productId": mug.id}))).await;

        let uri = format!("/cart/items/{}", mug.id);
        let (_, cart) = call(&app, "PATCH", &uri, Some("alice"), Some(json!({"quantity": 0}))).await;
        assert_eq!(cart["lines"][0]["quantity"], 1);

        let (status, cart) = call(&app, "DELETE", &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["lines"].as_array().unwrap().len(), 0);

        let (status, body) = call(&app, "DELETE", &uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "rejected");
    }

    #[tokio::test]
    async fn test_unknown_product_and_missing_session() {
        let (app, _db) = test_app().await;

        let (status, _) = call(&app, "GET", "/cart", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) =
            call(&app, "POST", "/cart/items", Some("alice"), Some(json!({"productId": "missing"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }
}
