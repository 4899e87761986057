//! Catalog and stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{NewProduct, ProductUpdate, StockLevel};
use common::{Money, ProductId, TailorId};
use domain::Product;
use serde::{Deserialize, Serialize};
use store::Database;

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    pub discounted_price_cents: Option<i64>,
    pub stock_quantity: i32,
    pub tailor_id: Option<TailorId>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price_cents: Option<i64>,
    pub discounted_price_cents: Option<i64>,
    /// Removes the current discount.
    #[serde(default)]
    pub clear_discount: bool,
}

#[derive(Deserialize)]
pub struct StockAdjustmentRequest {
    pub delta: i32,
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub available: bool,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub tailor_id: Option<String>,
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    pub discounted_price_cents: Option<i64>,
    pub effective_price_cents: i64,
    pub stock_quantity: i32,
    pub is_available: bool,
    pub sales_count: i64,
    pub view_count: i64,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.to_string(),
            tailor_id: p.tailor_id.map(|t| t.to_string()),
            effective_price_cents: p.effective_price().cents(),
            name: p.name,
            category: p.category,
            price_cents: p.price.cents(),
            discounted_price_cents: p.discounted_price.map(|m| m.cents()),
            stock_quantity: p.stock_quantity,
            is_available: p.is_available,
            sales_count: p.sales_count,
            view_count: p.view_count,
        }
    }
}

// -- Handlers --

/// GET /products — list products that are not deleted.
#[tracing::instrument(skip(state))]
pub async fn list<D: Database>(
    State(state): State<Arc<AppState<D>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.catalog.list_products().await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

/// POST /products — add a product to the catalog.
#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = state
        .catalog
        .create_product(NewProduct {
            name: req.name,
            category: req.category,
            price: Money::from_cents(req.price_cents),
            discounted_price: req.discounted_price_cents.map(Money::from_cents),
            stock_quantity: req.stock_quantity,
            tailor_id: req.tailor_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// GET /products/:id — load a product and count the view.
#[tracing::instrument(skip(state))]
pub async fn get<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id, "product")?;
    let product = state.catalog.view_product(id).await?;
    Ok(Json(product.into()))
}

/// PATCH /products/:id — edit name, category or prices.
#[tracing::instrument(skip(state, req))]
pub async fn update<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id, "product")?;
    let discounted_price = if req.clear_discount {
        Some(None)
    } else {
        req.discounted_price_cents.map(|c| Some(Money::from_cents(c)))
    };
    let product = state
        .catalog
        .update_product(
            id,
            ProductUpdate {
                name: req.name,
                category: req.category,
                price: req.price_cents.map(Money::from_cents),
                discounted_price,
            },
        )
        .await?;
    Ok(Json(product.into()))
}

/// DELETE /products/:id — soft-delete a product.
#[tracing::instrument(skip(state))]
pub async fn delete<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ProductId = parse_id(&id, "product")?;
    state.catalog.soft_delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /products/:id/stock — restock or consume stock.
#[tracing::instrument(skip(state, req), fields(delta = req.delta))]
pub async fn adjust_stock<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
    Json(req): Json<StockAdjustmentRequest>,
) -> Result<Json<StockLevel>, ApiError> {
    let id: ProductId = parse_id(&id, "product")?;
    Ok(Json(state.catalog.adjust_stock(id, req.delta).await?))
}

/// POST /products/:id/availability — enable or disable a product.
#[tracing::instrument(skip(state, req), fields(available = req.available))]
pub async fn set_availability<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Path(id): Path<String>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<StockLevel>, ApiError> {
    let id: ProductId = parse_id(&id, "product")?;
    Ok(Json(state.catalog.set_availability(id, req.available).await?))
}
