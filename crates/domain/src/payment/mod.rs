//! Payment record and its lifecycle.

mod record;
mod state;

pub use record::{Payment, PaymentType, ProviderMetadata, RefundOutcome, TransactionType};
pub use state::PaymentStatus;
