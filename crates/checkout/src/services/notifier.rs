//! Order notification trait with in-memory and logging implementations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::DependencyError;
use crate::orchestrator::OrderConfirmation;

/// Sends order confirmations to the customer.
///
/// Called after the checkout transaction commits; failures are logged and
/// never affect the checkout result.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_placed(&self, confirmation: &OrderConfirmation) -> Result<(), DependencyError>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<OrderConfirmation>,
    fail_on_send: bool,
}

/// In-memory notifier that records every confirmation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    pub fn sent(&self) -> Vec<OrderConfirmation> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn order_placed(&self, confirmation: &OrderConfirmation) -> Result<(), DependencyError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(DependencyError::new("notifier", "delivery failed"));
        }
        state.sent.push(confirmation.clone());
        Ok(())
    }
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn order_placed(&self, confirmation: &OrderConfirmation) -> Result<(), DependencyError> {
        tracing::info!(
            order_number = %confirmation.order_number,
            orders = confirmation.order_ids.len(),
            total = %confirmation.total_amount,
            "Order confirmation sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, OrderId, PaymentId};
    use domain::PaymentType;

    use super::*;
    use crate::orchestrator::NextStep;

    fn confirmation() -> OrderConfirmation {
        OrderConfirmation {
            order_ids: vec![OrderId::new()],
            payment_ids: vec![PaymentId::new()],
            order_number: "TS-0000ABCD".to_string(),
            total_amount: Money::from_major(100),
            payment_method: PaymentType::Cash,
            next_step: NextStep::Confirmed,
        }
    }

    #[tokio::test]
    async fn test_records_confirmations() {
        let notifier = InMemoryNotifier::new();
        notifier.order_placed(&confirmation()).await.unwrap();
        assert_eq!(notifier.sent_count(), 1);
        assert_eq!(notifier.sent()[0].order_number, "TS-0000ABCD");
    }

    #[tokio::test]
    async fn test_fail_on_send() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_send(true);
        assert!(notifier.order_placed(&confirmation()).await.is_err());
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_logging_notifier_never_fails() {
        assert!(LoggingNotifier.order_placed(&confirmation()).await.is_ok());
    }
}
