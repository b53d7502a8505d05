//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! # Catalog
//! GET    /products                        - Product listing (?category=&featured=)
//! GET    /products/{productId}            - Product detail
//!
//! # Cart
//! GET    /cart/{sessionId}                - Cart, or an empty default
//! POST   /cart/{sessionId}/items          - Add item
//! PUT    /cart/{sessionId}/items/{itemId} - Set item quantity
//! DELETE /cart/{sessionId}/items/{itemId} - Remove item
//! DELETE /cart/{sessionId}                - Clear cart
//!
//! # Payment
//! POST   /payment/create-payment-intent   - Create order and payment intent
//! POST   /payment/confirm-payment         - Settle order from the gateway
//! GET    /payment/order/{orderId}         - Order detail
//! GET    /payment/orders/{sessionId}      - Orders for a session, newest first
//! ```

pub mod cart;
pub mod payment;
pub mod products;

use std::str::FromStr;

use axum::{
    Router,
    routing::{get, post, put},
};

use greenhouse_core::SessionId;

use crate::error::AppError;
use crate::middleware::{RateLimiterLayer, RateLimits};
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{product_id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/{session_id}", get(cart::show).delete(cart::clear))
        .route("/{session_id}/items", post(cart::add_item))
        .route(
            "/{session_id}/items/{item_id}",
            put(cart::update_item).delete(cart::remove_item),
        )
}

/// Create the payment routes router.
///
/// Intent creation gets its own, stricter rate limit when one is configured.
pub fn payment_routes(checkout_limit: Option<RateLimiterLayer>) -> Router<AppState> {
    let create = post(payment::create_payment_intent);
    let create = match checkout_limit {
        Some(layer) => create.layer(layer),
        None => create,
    };

    Router::new()
        .route("/create-payment-intent", create)
        .route("/confirm-payment", post(payment::confirm_payment))
        .route("/order/{order_id}", get(payment::show_order))
        .route("/orders/{session_id}", get(payment::session_orders))
}

/// Create all routes for the storefront.
pub fn routes(limits: RateLimits) -> Router<AppState> {
    let router = Router::new()
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/payment", payment_routes(limits.checkout));

    match limits.api {
        Some(layer) => router.layer(layer),
        None => router,
    }
}

/// Parse a session id from a path or body, rejecting malformed ids with 400.
pub(crate) fn parse_session(raw: &str) -> Result<SessionId, AppError> {
    SessionId::parse(raw).map_err(|e| AppError::BadRequest(format!("Invalid session id: {e}")))
}

/// Parse an entity id from a path. A malformed id cannot exist, so it is a
/// 404 with the given message.
pub(crate) fn parse_id<T: FromStr>(raw: &str, not_found: &str) -> Result<T, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound(not_found.to_string()))
}
