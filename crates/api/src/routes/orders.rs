//! Order endpoints: custom orders, lookup, status changes and payments.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use checkout::{CustomItem, CustomOrderRequest};
use common::{Money, OrderId, TailorId, UserId};
use domain::{FulfillmentMethod, Order, OrderStatus, PaymentType};
use serde::{Deserialize, Serialize};
use store::Database;

use super::payments::PaymentResponse;
use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOrderItemRequest {
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomOrderRequest {
    pub user_id: UserId,
    pub tailor_id: TailorId,
    pub description: String,
    pub items: Vec<CustomOrderItemRequest>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fulfillment: FulfillmentMethod,
    pub shipping_address: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub user_id: UserId,
    pub amount_cents: i64,
    pub payment_method: PaymentType,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: Option<String>,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    pub tailor_id: Option<String>,
    pub description: String,
    pub status: OrderStatus,
    pub fulfillment: FulfillmentMethod,
    pub shipping_address: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub commission_cents: i64,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            customer_id: order.customer_id.to_string(),
            tailor_id: order.tailor_id.map(|t| t.to_string()),
            description: order.description,
            status: order.status,
            fulfillment: order.fulfillment,
            shipping_address: order.shipping_address,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.map(|p| p.to_string()),
                    description: item.description,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    total_cents: item.total.cents(),
                })
                .collect(),
            total_cents: order.total_price.cents(),
            commission_cents: order.commission_amount.cents(),
            created_at: order.created_at,
            due_date: order.due_date,
        }
    }
}

// -- Handlers --

/// POST /orders/custom — place a bespoke tailoring order.
#[tracing::instrument(skip(state, req), fields(tailor_id = %req.tailor_id))]
pub async fn create_custom<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Json(req): Json<CreateCustomOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let customer_id = state.customer(req.user_id).await?;
    let order = state
        .orders
        .place_custom_order(CustomOrderRequest {
            customer_id,
            tailor_id: req.tailor_id,
            description: req.description,
            items: req
                .items
                .into_iter()
                .map(|item| CustomItem {
                    description: item.description,
                    quantity: item.quantity,
                    unit_price: Money::from_cents(item.unit_price_cents),
                })
                .collect(),
            due_date: req.due_date,
            fulfillment: req.fulfillment,
            shipping_address: req.shipping_address,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/:id — load an order with its items.
#[tracing::instrument(skip(state))]
pub async fn get<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.orders.get_order(id).await?.into()))
}

/// PATCH /orders/:id/status — move an order along its lifecycle.
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.orders.update_status(id, req.status).await?.into()))
}

/// POST /orders/:id/payments — open a payment for an existing order.
#[tracing::instrument(skip(state, req), fields(method = %req.payment_method))]
pub async fn create_payment<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let id: OrderId = parse_id(&id, "order")?;
    let customer_id = state.customer(req.user_id).await?;
    let outcome = state
        .payments
        .process_payment(
            id,
            customer_id,
            Money::from_cents(req.amount_cents),
            req.payment_method,
        )
        .await?;

    let mut response = PaymentResponse::from(outcome.payment);
    response.client_secret = outcome.client_secret;
    response.order_status = Some(outcome.order_status);
    Ok((StatusCode::CREATED, Json(response)))
}
