//! Checkout and payment error types.

use common::{CartId, CartItemId, Money, OrderId, ProductId, UserId};
use domain::{DomainError, OrderStatus, PaymentStatus, PaymentType};
use store::StoreError;
use thiserror::Error;

/// Coarse classification every error reports, used by callers to pick a
/// response without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Dependency,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Dependency => "dependency",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn store_error_kind(err: &StoreError) -> ErrorKind {
    match err {
        StoreError::NotFound { .. } => ErrorKind::NotFound,
        StoreError::InsufficientStock { .. }
        | StoreError::StaleState { .. }
        | StoreError::Duplicate(_) => ErrorKind::Conflict,
        _ => ErrorKind::Unexpected,
    }
}

fn domain_error_kind(err: &DomainError) -> ErrorKind {
    match err {
        DomainError::InsufficientStock { .. }
        | DomainError::InvalidOrderTransition { .. }
        | DomainError::InvalidPaymentTransition { .. }
        | DomainError::RefundExceedsPayment { .. } => ErrorKind::Conflict,
        DomainError::ItemTotalMismatch { .. } | DomainError::OrderTotalMismatch { .. } => {
            ErrorKind::Unexpected
        }
        _ => ErrorKind::Validation,
    }
}

/// An external collaborator failed or could not be reached.
#[derive(Debug, Clone, Error)]
#[error("{service} unavailable: {reason}")]
pub struct DependencyError {
    pub service: &'static str,
    pub reason: String,
}

impl DependencyError {
    pub fn new(service: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}

/// Errors raised by the payment state machine.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Order {order_id} cannot be paid: {reason}")]
    OrderNotPayable { order_id: OrderId, reason: String },

    #[error("Payment amount {actual} does not match order total {expected}")]
    AmountMismatch { expected: Money, actual: Money },

    #[error("Order {0} is already paid")]
    AlreadyPaid(OrderId),

    #[error("Order {0} already has a payment awaiting completion")]
    PaymentPending(OrderId),

    #[error("Unsupported payment method: {0}")]
    UnsupportedMethod(PaymentType),

    #[error("Payment cannot move from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsPayment { requested: Money, refundable: Money },

    #[error("Refund amount must be positive, got {0}")]
    InvalidRefundAmount(Money),

    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(#[source] DependencyError),

    #[error("Domain error: {0}")]
    Domain(DomainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::OrderNotFound(_) | PaymentError::PaymentNotFound(_) => {
                ErrorKind::NotFound
            }
            PaymentError::AmountMismatch { .. }
            | PaymentError::UnsupportedMethod(_)
            | PaymentError::InvalidRefundAmount(_) => ErrorKind::Validation,
            PaymentError::OrderNotPayable { .. }
            | PaymentError::AlreadyPaid(_)
            | PaymentError::PaymentPending(_)
            | PaymentError::InvalidTransition { .. }
            | PaymentError::RefundExceedsPayment { .. } => ErrorKind::Conflict,
            PaymentError::ProviderUnavailable(_) => ErrorKind::Dependency,
            PaymentError::Domain(e) => domain_error_kind(e),
            PaymentError::Store(e) => store_error_kind(e),
        }
    }
}

impl From<DomainError> for PaymentError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidPaymentTransition { from, to } => {
                PaymentError::InvalidTransition { from, to }
            }
            DomainError::RefundExceedsPayment {
                requested,
                refundable,
            } => PaymentError::RefundExceedsPayment {
                requested,
                refundable,
            },
            DomainError::InvalidRefundAmount { amount } => PaymentError::InvalidRefundAmount(amount),
            other => PaymentError::Domain(other),
        }
    }
}

/// Errors raised by the cart, order and checkout services.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i32,
    },

    #[error("No customer profile for user {0}")]
    CustomerProfileNotFound(UserId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Product {0} is not available for purchase")]
    ProductUnavailable(ProductId),

    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    #[error("Cart item not found: {0}")]
    CartItemNotFound(CartItemId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("A shipping address is required")]
    InvalidShippingAddress,

    #[error("Unsupported payment method: {0}")]
    UnsupportedPaymentMethod(PaymentType),

    #[error("Order cannot move from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("Domain error: {0}")]
    Domain(DomainError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::EmptyCart
            | CheckoutError::InvalidQuantity(_)
            | CheckoutError::InvalidShippingAddress
            | CheckoutError::UnsupportedPaymentMethod(_)
            | CheckoutError::InvalidStatusTransition { .. } => ErrorKind::Validation,
            CheckoutError::InsufficientStock { .. } | CheckoutError::ProductUnavailable(_) => {
                ErrorKind::Conflict
            }
            CheckoutError::CustomerProfileNotFound(_)
            | CheckoutError::ProductNotFound(_)
            | CheckoutError::CartNotFound(_)
            | CheckoutError::CartItemNotFound(_)
            | CheckoutError::OrderNotFound(_) => ErrorKind::NotFound,
            CheckoutError::Payment(e) => e.kind(),
            CheckoutError::Dependency(_) => ErrorKind::Dependency,
            CheckoutError::Domain(e) => domain_error_kind(e),
            CheckoutError::Store(e) => store_error_kind(e),
            CheckoutError::Serialization(_) => ErrorKind::Unexpected,
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            other => CheckoutError::Store(other),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidQuantity { quantity } => CheckoutError::InvalidQuantity(quantity),
            DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            DomainError::InvalidOrderTransition { from, to } => {
                CheckoutError::InvalidStatusTransition { from, to }
            }
            other => CheckoutError::Domain(other),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
