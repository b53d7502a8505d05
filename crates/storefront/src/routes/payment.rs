//! Payment route handlers: checkout intents, confirmation and order lookup.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use greenhouse_core::{Order, OrderId, ShippingAddress};

use super::{parse_id, parse_session};
use crate::error::{ApiJson, Result};
use crate::services::{CheckoutIntent, CheckoutRequest, PaymentConfirmation};
use crate::state::AppState;

/// Checkout-intent request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    pub session_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub shipping_address: ShippingAddress,
}

/// Confirmation request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
    pub order_id: String,
}

/// Confirmation response body, for both outcomes.
#[derive(Debug, Serialize)]
pub struct ConfirmPaymentResponse {
    pub success: bool,
    pub message: &'static str,
    pub order: Order,
}

/// Snapshot the session cart into an order and open a payment intent.
#[instrument(skip(state, body), fields(session_id = %body.session_id))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreatePaymentIntentRequest>,
) -> Result<Json<CheckoutIntent>> {
    let request = CheckoutRequest {
        session_id: parse_session(&body.session_id)?,
        customer_email: body.customer_email,
        customer_name: body.customer_name,
        shipping_address: body.shipping_address,
    };
    let intent = state.checkout().create_payment_intent(request).await?;
    Ok(Json(intent))
}

/// Settle an order against its payment intent.
///
/// Returns `200` with `success: true` when paid and `400` with
/// `success: false` otherwise; both carry the order.
#[instrument(skip(state, body), fields(order_id = %body.order_id))]
pub async fn confirm_payment(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ConfirmPaymentRequest>,
) -> Result<(StatusCode, Json<ConfirmPaymentResponse>)> {
    let order_id: OrderId = parse_id(&body.order_id, "Order not found")?;
    let outcome = state
        .checkout()
        .confirm_payment(&body.payment_intent_id, order_id)
        .await?;

    let response = match outcome {
        PaymentConfirmation::Paid(order) => (
            StatusCode::OK,
            Json(ConfirmPaymentResponse {
                success: true,
                message: "Payment successful",
                order,
            }),
        ),
        PaymentConfirmation::Failed(order) => (
            StatusCode::BAD_REQUEST,
            Json(ConfirmPaymentResponse {
                success: false,
                message: "Payment failed",
                order,
            }),
        ),
    };
    Ok(response)
}

/// Show one order.
#[instrument(skip(state))]
pub async fn show_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>> {
    let order_id: OrderId = parse_id(&order_id, "Order not found")?;
    let order = state.checkout().get_order(order_id).await?;
    Ok(Json(order))
}

/// Orders placed by a session, newest first.
#[instrument(skip(state))]
pub async fn session_orders(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Order>>> {
    let session_id = parse_session(&session_id)?;
    let orders = state.checkout().orders_for_session(&session_id).await?;
    Ok(Json(orders))
}
