//! Payment completion, cancellation, refund and provider callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{Money, PaymentId};
use domain::{OrderStatus, Payment, PaymentStatus, PaymentType, RefundOutcome};
use serde::{Deserialize, Serialize};
use store::Database;

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub amount_cents: i64,
    pub reason: Option<String>,
}

/// Callback sent by the card provider once the customer finishes the card flow.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub provider_transaction_id: String,
    pub succeeded: bool,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub requires_action: bool,
    pub refunded_cents: i64,
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id.to_string(),
            order_id: p.order_id.to_string(),
            amount_cents: p.amount.cents(),
            payment_type: p.payment_type,
            status: p.status,
            requires_action: p.requires_action,
            refunded_cents: p.refunded_amount.cents(),
            paid_at: p.paid_at,
            client_secret: None,
            order_status: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    #[serde(flatten)]
    pub payment: PaymentResponse,
    pub full_refund: bool,
}

// -- Handlers --

/// GET /payments/:id
#[tracing::instrument(skip(state))]
pub async fn get<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let id: PaymentId = parse_id(&id, "payment")?;
    Ok(Json(state.payments.get_payment(id).await?.into()))
}

/// POST /payments/:id/complete — record that the money was collected.
#[tracing::instrument(skip(state))]
pub async fn complete<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let id: PaymentId = parse_id(&id, "payment")?;
    Ok(Json(state.payments.complete_payment(id).await?.into()))
}

/// POST /payments/:id/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let id: PaymentId = parse_id(&id, "payment")?;
    Ok(Json(state.payments.cancel_payment(id).await?.into()))
}

/// POST /payments/:id/refund — refund part or all of a captured payment.
#[tracing::instrument(skip(state, req), fields(amount_cents = req.amount_cents))]
pub async fn refund<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let id: PaymentId = parse_id(&id, "payment")?;
    let receipt = state
        .payments
        .process_refund(id, Money::from_cents(req.amount_cents), req.reason)
        .await?;

    let mut payment = PaymentResponse::from(receipt.payment);
    payment.order_status = Some(receipt.order_status);
    Ok(Json(RefundResponse {
        payment,
        full_refund: receipt.outcome == RefundOutcome::Full,
    }))
}

/// POST /payments/webhook — card provider confirmation.
#[tracing::instrument(skip(state, req), fields(succeeded = req.succeeded))]
pub async fn webhook<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Json(req): Json<WebhookRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state
        .payments
        .confirm_card_payment(&req.provider_transaction_id, req.succeeded)
        .await?;
    Ok(Json(payment.into()))
}
