//! Gift cards and loyalty points.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use checkout_core::{GiftCard, LoyaltyWallet};

use crate::error::ApiResult;
use crate::session::Session;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

pub async fn gift_cards(State(state): State<AppState>, session: Session) -> ApiResult<Json<Vec<GiftCard>>> {
    Ok(Json(state.engine.checkout.gift_cards(&session.user_id).await?))
}

/// `POST /gift-cards/redeem {code}`: claims the card for the caller.
pub async fn redeem_gift_card(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<RedeemRequest>,
) -> ApiResult<Json<GiftCard>> {
    let card = state
        .engine
        .checkout
        .redeem_gift_card(&session.user_id, &body.code)
        .await?;
    Ok(Json(card))
}

pub async fn loyalty(State(state): State<AppState>, session: Session) -> ApiResult<Json<LoyaltyWallet>> {
    Ok(Json(state.engine.checkout.loyalty_wallet(&session.user_id).await?))
}
