//! Checkout endpoints: JSON for API clients, form posts for the storefront.

use std::sync::Arc;

use ::checkout::{CheckoutRequest, OrderConfirmation};
use axum::Json;
use axum::extract::{Form, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use common::UserId;
use domain::{FulfillmentMethod, PaymentType};
use serde::{Deserialize, Serialize};
use store::Database;

use super::{AppState, parse_id};
use crate::error::ApiError;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub user_id: UserId,
    pub payment_method: PaymentType,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub fulfillment: FulfillmentMethod,
    pub idempotency_key: Option<String>,
}

/// Fields posted by the storefront checkout form.
#[derive(Deserialize)]
pub struct CheckoutForm {
    pub user_id: String,
    pub payment_method: String,
    #[serde(default)]
    pub shipping_address: String,
    pub fulfillment: Option<String>,
    pub idempotency_key: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub success: bool,
    #[serde(flatten)]
    pub confirmation: OrderConfirmation,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmationQuery<'a> {
    order_number: &'a str,
}

#[derive(Serialize)]
struct FlashQuery<'a> {
    kind: &'a str,
    message: &'a str,
}

fn header_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn parse_form(form: CheckoutForm) -> Result<CheckoutRequest, ApiError> {
    let payment_method = form
        .payment_method
        .parse::<PaymentType>()
        .map_err(|_| ApiError::BadRequest(format!("Unknown payment method: {}", form.payment_method)))?;
    let fulfillment = match form.fulfillment.as_deref() {
        None | Some("") => FulfillmentMethod::default(),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Unknown fulfillment method: {raw}")))?,
    };
    Ok(CheckoutRequest {
        user_id: parse_id(&form.user_id, "user")?,
        payment_method,
        shipping_address: form.shipping_address,
        fulfillment,
        idempotency_key: form.idempotency_key.filter(|k| !k.is_empty()),
    })
}

fn redirect_with<T: Serialize>(path: &str, query: &T) -> Redirect {
    match serde_urlencoded::to_string(query) {
        Ok(query) => Redirect::to(&format!("{path}?{query}")),
        Err(_) => Redirect::to(path),
    }
}

// -- Handlers --

/// POST /checkout — check out the caller's cart.
///
/// The idempotency key may come from the body or the `Idempotency-Key` header.
#[tracing::instrument(skip(state, headers, body), fields(user_id = %body.user_id))]
pub async fn submit<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    headers: HeaderMap,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let request = CheckoutRequest {
        user_id: body.user_id,
        payment_method: body.payment_method,
        shipping_address: body.shipping_address,
        fulfillment: body.fulfillment,
        idempotency_key: body.idempotency_key.or_else(|| header_key(&headers)),
    };
    let confirmation = state.checkout.checkout(request).await?;
    Ok(Json(CheckoutResponse {
        success: true,
        confirmation,
    }))
}

/// POST /checkout/form — storefront form post.
///
/// Always answers `303 See Other`: to the confirmation page on success, or
/// back to the cart with the error kind and message as query parameters.
#[tracing::instrument(skip(state, form))]
pub async fn submit_form<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    Form(form): Form<CheckoutForm>,
) -> Redirect {
    let result = match parse_form(form) {
        Ok(request) => state.checkout.checkout(request).await.map_err(ApiError::from),
        Err(e) => Err(e),
    };

    match result {
        Ok(confirmation) => redirect_with(
            "/checkout/confirmation",
            &ConfirmationQuery {
                order_number: &confirmation.order_number,
            },
        ),
        Err(e) => {
            let message = e.public_message();
            redirect_with(
                "/cart",
                &FlashQuery {
                    kind: e.kind().as_str(),
                    message: &message,
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(method: &str, fulfillment: Option<&str>) -> CheckoutForm {
        CheckoutForm {
            user_id: UserId::new().to_string(),
            payment_method: method.to_string(),
            shipping_address: "Street 1".to_string(),
            fulfillment: fulfillment.map(str::to_string),
            idempotency_key: Some(String::new()),
        }
    }

    #[test]
    fn test_parse_form() {
        let request = parse_form(form("Card", Some("Pickup"))).unwrap();
        assert_eq!(request.payment_method, PaymentType::Card);
        assert_eq!(request.fulfillment, FulfillmentMethod::Pickup);
        assert!(request.idempotency_key.is_none());

        let request = parse_form(form("Cash", None)).unwrap();
        assert_eq!(request.fulfillment, FulfillmentMethod::Delivery);

        assert!(parse_form(form("Cheque", None)).is_err());
    }

    #[test]
    fn test_flash_redirect_is_encoded() {
        let redirect = redirect_with(
            "/cart",
            &FlashQuery {
                kind: "validation",
                message: "Your cart is empty",
            },
        );
        let response = axum::response::IntoResponse::into_response(redirect);
        assert_eq!(response.status(), axum::http::StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"],
            "/cart?kind=validation&message=Your+cart+is+empty"
        );
    }
}
