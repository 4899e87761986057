use common::ProductId;
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional stock update found too few units.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i32,
    },

    /// A conditional update found the row in a different state than expected.
    #[error("{entity} {id} is no longer in state {expected}")]
    StaleState {
        entity: &'static str,
        id: String,
        expected: String,
    },

    /// A uniqueness rule was violated (e.g. a second completed payment).
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// A failure injected through the in-memory adapter.
    #[error("Injected failure at {0}")]
    Injected(&'static str),

    /// A stored value could not be mapped back into the domain.
    #[error("Invalid stored data: {0}")]
    Decode(#[from] DomainError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn stale(entity: &'static str, id: impl ToString, expected: impl ToString) -> Self {
        StoreError::StaleState {
            entity,
            id: id.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
