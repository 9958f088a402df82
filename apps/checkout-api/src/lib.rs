//! # checkout-api: HTTP Surface for the Storefront Checkout
//!
//! ## Routes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET    /health                                                         │
//! │  GET    /cart                     POST   /cart/items                    │
//! │  PATCH  /cart/items/{productId}   DELETE /cart/items/{productId}        │
//! │  POST   /cart/coupon              DELETE /cart/coupon                   │
//! │  POST   /checkout                 GET    /orders/{id}                   │
//! │  POST   /payment/{provider}/start POST   /payment/{provider}/confirm    │
//! │  POST   /webhooks/{provider}                                            │
//! │  POST   /orders/{id}/return       POST   /orders/{id}/returnItem/{item} │
//! │  GET    /gift-cards               POST   /gift-cards/redeem             │
//! │  GET    /loyalty                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every route except `/health` and `/webhooks/*` needs the `x-session-id`
//! and `x-user-id` headers (see [`session`]).

pub mod cart_store;
pub mod error;
pub mod handlers;
pub mod session;

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tokio::sync::Mutex;

use checkout_core::cart::Cart;
use checkout_db::Database;
use checkout_engine::Engine;

pub use cart_store::CartStore;
pub use error::{ApiError, ApiResult};
pub use session::Session;

// =============================================================================
// State
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub db: Database,
    pub carts: CartStore,
}

impl AppState {
    pub fn new(engine: Engine, db: Database) -> Self {
        AppState {
            engine,
            db,
            carts: CartStore::default(),
        }
    }

    pub fn with_carts(mut self, carts: CartStore) -> Self {
        self.carts = carts;
        self
    }

    pub async fn cart(&self, session: &Session) -> Arc<Mutex<Cart>> {
        self.carts
            .session(&session.session_id, || self.engine.checkout.new_cart())
            .await
    }
}

// =============================================================================
// Router
// =============================================================================

pub fn router(state: AppState) -> Router {
    use handlers::{cart, checkout, orders, payment, wallet};

    Router::new()
        .route("/health", get(handlers::health))
        // Cart
        .route("/cart", get(cart::show))
        .route("/cart/items", post(cart::add_item))
        .route(
            "/cart/items/{product_id}",
            patch(cart::set_quantity).delete(cart::remove_item),
        )
        .route("/cart/coupon", post(cart::apply_coupon).delete(cart::remove_coupon))
        // Checkout
        .route("/checkout", post(checkout::place_order))
        // Payments
        .route("/payment/{provider}/start", post(payment::start))
        .route("/payment/{provider}/confirm", post(payment::confirm))
        .route("/webhooks/{provider}", post(payment::webhook))
        // Orders
        .route("/orders/{order_id}", get(orders::show))
        .route("/orders/{order_id}/return", post(orders::request_return))
        .route(
            "/orders/{order_id}/returnItem/{item_id}",
            post(orders::request_item_return),
        )
        // Wallets
        .route("/gift-cards", get(wallet::gift_cards))
        .route("/gift-cards/redeem", post(wallet::redeem_gift_card))
        .route("/loyalty", get(wallet::loyalty))
        .with_state(state)
}

/// Today's date for coupon windows and gift-card expiry.
pub(crate) fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}
