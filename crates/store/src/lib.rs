//! Persistence for the checkout core.
//!
//! One narrow port per aggregate (catalog, cart, order, payment, idempotency)
//! keeps invariants enforceable at the boundary. All ports are implemented by
//! a [`Transaction`]; nothing is visible to other transactions until commit.

pub mod error;
pub mod memory;
pub mod ports;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::{FailPoint, InMemoryDatabase, InMemoryTransaction};
pub use ports::{
    CartStore, CatalogStore, Database, IdempotencyStore, OrderStore, PaymentStore, Transaction,
};
pub use postgres::{PgTransaction, PostgresDatabase};
