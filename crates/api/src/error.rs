//! API error types with HTTP response mapping.

use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, ErrorKind, PaymentError};
use serde::Serialize;

const UNEXPECTED_MESSAGE: &str = "Something went wrong, please try again later";
const DEPENDENCY_MESSAGE: &str = "A required service is unavailable, please try again later";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (bad ID, unparsable body field).
    BadRequest(String),
    Checkout(CheckoutError),
    Payment(PaymentError),
}

/// JSON body of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub kind: &'static str,
    pub message: String,
}

/// Full error text, attached to responses whose public message is generic.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Dependency => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Checkout(e) => e.kind(),
            ApiError::Payment(e) => e.kind(),
        }
    }

    /// Message safe to show to the customer.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Unexpected => UNEXPECTED_MESSAGE.to_string(),
            ErrorKind::Dependency => DEPENDENCY_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "{msg}"),
            ApiError::Checkout(e) => write!(f, "{e}"),
            ApiError::Payment(e) => write!(f, "{e}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        let detail = self.to_string();

        match kind {
            ErrorKind::Unexpected => tracing::error!(error = %detail, "internal server error"),
            ErrorKind::Dependency => tracing::warn!(error = %detail, "dependency unavailable"),
            _ => tracing::debug!(error = %detail, kind = %kind, "request rejected"),
        }

        let body = ErrorBody {
            success: false,
            kind: kind.as_str(),
            message: self.public_message(),
        };
        let mut response = (status, axum::Json(body)).into_response();
        response.extensions_mut().insert(ErrorDetail(detail));
        response
    }
}

/// Replaces generic error messages with the full error text.
///
/// Only installed when `EXPOSE_ERROR_DETAILS` is enabled.
pub async fn expose_error_details(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let (parts, body) = response.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, usize::MAX).await else {
        return Response::from_parts(parts, Body::empty());
    };
    let mut json: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(json) => json,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };
    json["message"] = serde_json::Value::String(detail);

    let mut parts = parts;
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(json.to_string()))
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
