//! Cart route handlers.
//!
//! Carts are keyed by the guest session id in the path. Responses are
//! populated with a summary of each line's current catalog product.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use greenhouse_core::{Cart, CartItem, CartItemId, Money, Product, ProductId, SessionId};

use super::{parse_id, parse_session};
use crate::error::{ApiJson, Result};
use crate::state::AppState;

/// Current catalog data for a cart line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub image: String,
    pub category: String,
    pub in_stock: bool,
}

impl From<Product> for ProductSummary {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            price: product.price,
            image: product.image,
            category: product.category,
            in_stock: product.in_stock,
        }
    }
}

/// Cart line as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    #[serde(flatten)]
    pub item: CartItem,
    /// `None` once the product has left the catalog.
    pub product: Option<ProductSummary>,
}

/// Cart as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub session_id: SessionId,
    pub items: Vec<CartItemView>,
    pub total: Money,
    pub item_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

const fn default_quantity() -> i64 {
    1
}

/// Quantity update request body.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

/// Attach product summaries to every line of `cart`.
async fn populate(state: &AppState, cart: Cart) -> Result<CartView> {
    let ids: Vec<ProductId> = cart.items().iter().map(|item| item.product_id).collect();
    let mut products: HashMap<ProductId, Product> = state
        .store()
        .catalog()
        .get_many(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let items = cart
        .items()
        .iter()
        .map(|item| CartItemView {
            item: item.clone(),
            product: products.remove(&item.product_id).map(ProductSummary::from),
        })
        .collect();

    Ok(CartView {
        session_id: cart.session_id().clone(),
        items,
        total: cart.total(),
        item_count: cart.item_count(),
        created_at: cart.created_at(),
        updated_at: cart.updated_at(),
    })
}

/// Show the session cart, or an empty one if none exists yet.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<CartView>> {
    let session_id = parse_session(&session_id)?;
    let cart = state.cart().get_or_empty(&session_id).await?;
    Ok(Json(populate(&state, cart).await?))
}

/// Add a product to the cart.
#[instrument(skip(state, body))]
pub async fn add_item(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ApiJson(body): ApiJson<AddItemRequest>,
) -> Result<(StatusCode, Json<CartView>)> {
    let session_id = parse_session(&session_id)?;
    let product_id = parse_id(&body.product_id, "Product not found")?;
    let cart = state
        .cart()
        .add_item(&session_id, product_id, body.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(populate(&state, cart).await?)))
}

/// Set one line's quantity.
#[instrument(skip(state, body))]
pub async fn update_item(
    State(state): State<AppState>,
    Path((session_id, item_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    let session_id = parse_session(&session_id)?;
    let item_id: CartItemId = parse_id(&item_id, "Item not found")?;
    let cart = state
        .cart()
        .set_item_quantity(&session_id, item_id, body.quantity)
        .await?;
    Ok(Json(populate(&state, cart).await?))
}

/// Remove one line. Removing a line that is already gone is not an error.
#[instrument(skip(state))]
pub async fn remove_item(
    State(state): State<AppState>,
    Path((session_id, item_id)): Path<(String, String)>,
) -> Result<Json<CartView>> {
    let session_id = parse_session(&session_id)?;
    let item_id: CartItemId = parse_id(&item_id, "Item not found")?;
    let cart = state.cart().remove_item(&session_id, item_id).await?;
    Ok(Json(populate(&state, cart).await?))
}

/// Empty the cart.
#[instrument(skip(state))]
pub async fn clear(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<CartView>> {
    let session_id = parse_session(&session_id)?;
    let cart = state.cart().clear(&session_id).await?;
    Ok(Json(populate(&state, cart).await?))
}
