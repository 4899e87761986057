//! Shared types for the Tafsilk checkout core.
//!
//! Every crate in the workspace speaks in these identifiers and money
//! amounts, so they live at the bottom of the dependency graph.

pub mod money;
pub mod types;

pub use money::{CommissionRate, Money};
pub use types::{
    CartId, CartItemId, CustomerId, OrderId, OrderItemId, PaymentId, ProductId, TailorId, UserId,
};
