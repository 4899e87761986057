//! Checkout workflow for the Tafsilk marketplace.
//!
//! This crate turns a customer's cart into priced orders and payments:
//! 1. Validate the request and resolve the customer profile
//! 2. Decrement stock and assemble one order per tailor
//! 3. Open one payment per order (cash or card)
//! 4. Commit, then notify the customer
//!
//! Steps 2 and 3 share one store transaction, so a failure anywhere leaves
//! stock, orders, payments and the cart exactly as they were.

pub mod cart;
pub mod catalog;
pub mod error;
pub mod orchestrator;
pub mod orders;
pub mod payment;
pub mod services;
pub mod settings;

pub use cart::CartService;
pub use catalog::{CatalogService, NewProduct, ProductUpdate, StockLevel};
pub use error::{CheckoutError, DependencyError, ErrorKind, PaymentError};
pub use orchestrator::{CheckoutRequest, CheckoutService, NextStep, OrderConfirmation, order_number};
pub use orders::{CustomItem, CustomOrderRequest, OrderAssembly, ShippingInfo};
pub use payment::{PaymentOutcome, PaymentProcessor, RefundReceipt};
pub use services::{
    CardPaymentProvider, InMemoryCardProvider, InMemoryNotifier, InMemoryProfileDirectory,
    LoggingNotifier, Notifier, PaymentIntent, ProfileDirectory,
};
pub use settings::{CheckoutSettings, RefundPolicy};
