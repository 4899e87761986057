//! Domain error types.

use common::{Money, ProductId};
use thiserror::Error;

use crate::order::OrderStatus;
use crate::payment::PaymentStatus;

/// Invariant violations raised by domain entities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Quantity must be strictly positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Price must be strictly positive.
    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: Money },

    /// Stock quantity cannot be negative.
    #[error("Invalid stock quantity: {quantity} (must not be negative)")]
    InvalidStock { quantity: i64 },

    /// A stock decrement would leave the product below zero.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i32,
    },

    /// An order item's stored total disagrees with unit price times quantity.
    #[error("Order item total mismatch: expected {expected}, stored {actual}")]
    ItemTotalMismatch { expected: Money, actual: Money },

    /// A price, line total or sum does not fit in the money type.
    #[error("Amount too large")]
    AmountOverflow,

    /// An order's stored total disagrees with the sum of its items.
    #[error("Order total mismatch: items sum to {expected}, stored {actual}")]
    OrderTotalMismatch { expected: Money, actual: Money },

    /// Orders must contain at least one item.
    #[error("Order has no items")]
    OrderHasNoItems,

    #[error("Invalid order transition from {from} to {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid payment transition from {from} to {to}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Refund amounts must be strictly positive.
    #[error("Invalid refund amount: {amount}")]
    InvalidRefundAmount { amount: Money },

    /// Cumulative refunds may not exceed the paid amount.
    #[error("Refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsPayment { requested: Money, refundable: Money },

    /// A persisted enum value could not be parsed.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
