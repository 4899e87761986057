//! Customer profile and order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::UserId;
use serde::Serialize;
use store::Database;

use super::orders::OrderResponse;
use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_id: String,
    pub customer_id: String,
}

/// POST /customers/:user_id — create the customer profile for a user.
///
/// Registering twice returns the existing profile.
#[tracing::instrument(skip(state))]
pub async fn register<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(user_id): Path<String>,
) -> Result<(StatusCode, Json<ProfileResponse>), ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let customer_id = state.profiles.register(user_id);
    Ok((
        StatusCode::CREATED,
        Json(ProfileResponse {
            user_id: user_id.to_string(),
            customer_id: customer_id.to_string(),
        }),
    ))
}

/// GET /customers/:user_id/orders — the customer's orders, oldest first.
#[tracing::instrument(skip(state))]
pub async fn orders<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let customer_id = state.customer(user_id).await?;
    let orders = state.orders.list_customer_orders(customer_id).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}
