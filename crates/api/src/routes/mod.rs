//! HTTP handlers and the state they share.

pub mod carts;
pub mod checkout;
pub mod customers;
pub mod ops;
pub mod orders;
pub mod payments;
pub mod products;

use std::str::FromStr;

use ::checkout::{
    CartService, CatalogService, CheckoutError, CheckoutService, InMemoryProfileDirectory,
    OrderAssembly, PaymentProcessor, ProfileDirectory,
};
use common::{CustomerId, UserId};
use store::Database;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<D: Database> {
    pub catalog: CatalogService<D>,
    pub carts: CartService<D>,
    pub orders: OrderAssembly<D>,
    pub payments: PaymentProcessor<D>,
    pub checkout: CheckoutService<D>,
    pub profiles: InMemoryProfileDirectory,
    /// Storage backend name reported by `/health`.
    pub storage: &'static str,
    pub expose_error_details: bool,
}

impl<D: Database> AppState<D> {
    /// Maps an authenticated user to their customer profile.
    pub async fn customer(&self, user_id: UserId) -> Result<CustomerId, ApiError> {
        self.profiles
            .customer_profile(user_id)
            .await
            .map_err(CheckoutError::from)?
            .ok_or_else(|| CheckoutError::CustomerProfileNotFound(user_id).into())
    }
}

/// Parses a path segment into a typed identifier.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what} ID: {raw}")))
}
