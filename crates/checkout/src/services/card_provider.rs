//! Card payment provider trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId};

use crate::error::DependencyError;

/// A payment intent opened with the card provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Token handed to the client to finish the card flow.
    pub client_secret: String,
    /// Reference the provider echoes back when confirming.
    pub provider_transaction_id: String,
}

/// An external card processor.
#[async_trait]
pub trait CardPaymentProvider: Send + Sync {
    /// Name stored on payments created through this provider.
    fn name(&self) -> &str;

    async fn create_payment_intent(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: &str,
    ) -> Result<PaymentIntent, DependencyError>;

    /// Voids an intent whose payment was never recorded.
    async fn cancel_payment_intent(&self, provider_transaction_id: &str)
    -> Result<(), DependencyError>;
}

#[derive(Debug, Default)]
struct InMemoryCardState {
    intents: HashMap<String, (OrderId, Money, String)>,
    cancelled: Vec<String>,
    next_id: u32,
    fail_on_create: bool,
    /// Intents still allowed before creation starts failing.
    remaining_before_failure: Option<u32>,
}

/// In-memory card provider for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCardProvider {
    state: Arc<RwLock<InMemoryCardState>>,
}

impl InMemoryCardProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the provider to fail on intent creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Lets the next `count` intents succeed, then fails every later one.
    pub fn fail_after(&self, count: u32) {
        self.state.write().unwrap().remaining_before_failure = Some(count);
    }

    /// Returns the ids of intents cancelled so far.
    pub fn cancelled(&self) -> Vec<String> {
        self.state.read().unwrap().cancelled.clone()
    }

    /// Returns the number of open intents.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents.len()
    }

    /// Returns the order and amount an intent was opened for.
    pub fn intent(&self, provider_transaction_id: &str) -> Option<(OrderId, Money)> {
        self.state
            .read()
            .unwrap()
            .intents
            .get(provider_transaction_id)
            .map(|(order_id, amount, _)| (*order_id, *amount))
    }
}

#[async_trait]
impl CardPaymentProvider for InMemoryCardProvider {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn create_payment_intent(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: &str,
    ) -> Result<PaymentIntent, DependencyError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create || state.remaining_before_failure == Some(0) {
            return Err(DependencyError::new("card provider", "intent creation failed"));
        }
        if let Some(remaining) = state.remaining_before_failure.as_mut() {
            *remaining -= 1;
        }

        state.next_id += 1;
        let provider_transaction_id = format!("pi_{:04}", state.next_id);
        state.intents.insert(
            provider_transaction_id.clone(),
            (order_id, amount, currency.to_string()),
        );

        Ok(PaymentIntent {
            client_secret: format!("{provider_transaction_id}_secret"),
            provider_transaction_id,
        })
    }

    async fn cancel_payment_intent(
        &self,
        provider_transaction_id: &str,
    ) -> Result<(), DependencyError> {
        let mut state = self.state.write().unwrap();
        if state.intents.remove(provider_transaction_id).is_none() {
            return Err(DependencyError::new(
                "card provider",
                format!("unknown intent {provider_transaction_id}"),
            ));
        }
        state.cancelled.push(provider_transaction_id.to_string());
        Ok(())
    }
}
