//! Domain layer for the Tafsilk checkout core.
//!
//! This crate provides the entities the checkout workflow operates on:
//! - Product with its stock ledger rules
//! - ShoppingCart and CartItem with merge-on-add identity
//! - Order and OrderItem with total and commission invariants
//! - Payment with its lifecycle state machine

pub mod cart;
pub mod error;
pub mod order;
pub mod payment;
pub mod product;

pub use cart::{CartItem, CartLine, CartSummary, ShoppingCart, normalize_variant};
pub use error::DomainError;
pub use order::{FulfillmentMethod, NewOrder, Order, OrderItem, OrderLine, OrderStatus};
pub use payment::{
    Payment, PaymentStatus, PaymentType, ProviderMetadata, RefundOutcome, TransactionType,
};
pub use product::{Product, effective_price};
