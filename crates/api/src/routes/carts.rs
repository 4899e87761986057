//! Shopping cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use common::{CartItemId, ProductId, UserId};
use domain::{CartItem, CartLine, CartSummary, DomainError};
use serde::{Deserialize, Serialize};
use store::Database;

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemResponse {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
}

impl From<CartItem> for CartItemResponse {
    fn from(item: CartItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            size: item.size,
            color: item.color,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineResponse {
    #[serde(flatten)]
    pub item: CartItemResponse,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub is_available: bool,
}

impl TryFrom<CartLine> for CartLineResponse {
    type Error = DomainError;

    fn try_from(line: CartLine) -> Result<Self, Self::Error> {
        Ok(Self {
            unit_price_cents: line.unit_price.cents(),
            line_total_cents: line.line_total()?.cents(),
            is_available: line.is_available && !line.is_deleted,
            product_name: line.product_name,
            item: line.item.into(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub cart_id: String,
    pub items: Vec<CartLineResponse>,
    pub subtotal_cents: i64,
    pub item_count: u64,
}

impl TryFrom<CartSummary> for CartResponse {
    type Error = DomainError;

    fn try_from(summary: CartSummary) -> Result<Self, Self::Error> {
        Ok(Self {
            cart_id: summary.cart_id.to_string(),
            subtotal_cents: summary.subtotal.cents(),
            item_count: summary.item_count,
            items: summary
                .lines
                .into_iter()
                .map(CartLineResponse::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Serialize)]
pub struct ClearCartResponse {
    pub removed: u64,
}

// -- Handlers --

/// GET /customers/:user_id/cart — the active cart with live prices.
#[tracing::instrument(skip(state))]
pub async fn get<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let customer_id = state.customer(user_id).await?;
    let cart = state.carts.get_or_create_cart(customer_id).await?;
    let summary = state.carts.summary(cart.id).await?;
    let response = CartResponse::try_from(summary).map_err(CheckoutError::from)?;
    Ok(Json(response))
}

/// POST /customers/:user_id/cart/items — add or merge a line.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id, quantity = req.quantity))]
pub async fn add_item<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(user_id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartItemResponse>), ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let customer_id = state.customer(user_id).await?;
    let cart = state.carts.get_or_create_cart(customer_id).await?;
    let item = state
        .carts
        .add_item(cart.id, req.product_id, req.quantity, req.size, req.color)
        .await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// DELETE /customers/:user_id/cart — empty the active cart.
#[tracing::instrument(skip(state))]
pub async fn clear<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(user_id): Path<String>,
) -> Result<Json<ClearCartResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let customer_id = state.customer(user_id).await?;
    let cart = state.carts.get_or_create_cart(customer_id).await?;
    let removed = state.carts.clear(cart.id).await?;
    Ok(Json(ClearCartResponse { removed }))
}

/// PATCH /cart-items/:id — set a quantity; zero removes the line.
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn update_item<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Response, ApiError> {
    let id: CartItemId = parse_id(&id, "cart item")?;
    Ok(match state.carts.update_quantity(id, req.quantity).await? {
        Some(item) => Json(CartItemResponse::from(item)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// DELETE /cart-items/:id — remove a line.
#[tracing::instrument(skip(state))]
pub async fn remove_item<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: CartItemId = parse_id(&id, "cart item")?;
    state.carts.remove_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
