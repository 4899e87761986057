//! External collaborator traits and in-memory implementations.

pub mod card_provider;
pub mod notifier;
pub mod profile;

pub use card_provider::{CardPaymentProvider, InMemoryCardProvider, PaymentIntent};
pub use notifier::{InMemoryNotifier, LoggingNotifier, Notifier};
pub use profile::{InMemoryProfileDirectory, ProfileDirectory};
