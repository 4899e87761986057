//! Payment processing, completion and refunds.
//!
//! Payments move through the lifecycle enforced by
//! [`domain::PaymentStatus`]; every status write is conditional on the status
//! that was read, and the store refuses a second completed payment per order.

use std::sync::Arc;

use common::{CustomerId, Money, OrderId, PaymentId};
use domain::{OrderStatus, Payment, PaymentStatus, PaymentType, ProviderMetadata, RefundOutcome};
use store::{Database, OrderStore, PaymentStore, StoreError, Transaction};

use crate::error::PaymentError;
use crate::services::CardPaymentProvider;
use crate::settings::{CheckoutSettings, RefundPolicy};

type Result<T> = std::result::Result<T, PaymentError>;

/// Maximum difference between a submitted amount and the order total.
pub const AMOUNT_TOLERANCE_CENTS: i64 = 1;

/// The result of opening a payment.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment: Payment,
    /// Order status after the payment was recorded.
    pub order_status: OrderStatus,
    /// Card flow token, when a provider intent was opened.
    pub client_secret: Option<String>,
}

/// The result of a refund.
#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub payment: Payment,
    pub outcome: RefundOutcome,
    pub order_status: OrderStatus,
}

fn completion_conflict(order_id: OrderId) -> impl FnOnce(StoreError) -> PaymentError {
    move |err| match err {
        StoreError::Duplicate(_) => PaymentError::AlreadyPaid(order_id),
        other => other.into(),
    }
}

/// Creates, completes, cancels and refunds payments.
#[derive(Clone)]
pub struct PaymentProcessor<D: Database> {
    db: D,
    card_provider: Option<Arc<dyn CardPaymentProvider>>,
    settings: CheckoutSettings,
}

impl<D: Database> PaymentProcessor<D> {
    pub fn new(
        db: D,
        card_provider: Option<Arc<dyn CardPaymentProvider>>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db,
            card_provider,
            settings,
        }
    }

    /// Opens a payment for an order in its own transaction.
    #[tracing::instrument(skip(self))]
    pub async fn process_payment(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        amount: Money,
        method: PaymentType,
    ) -> Result<PaymentOutcome> {
        let mut tx = self.db.begin().await?;
        let outcome = self
            .process_in(&mut tx, order_id, customer_id, amount, method)
            .await?;
        if let Err(e) = tx.commit().await {
            self.release_intent(&outcome.payment).await;
            return Err(e.into());
        }
        Ok(outcome)
    }

    /// Opens a payment for an order inside an open transaction.
    ///
    /// Cash payments stay `Pending` until collected and confirm the order right
    /// away. Card payments stay `Pending` until the provider confirms them;
    /// without a provider they are flagged `requires_action`.
    pub async fn process_in<T>(
        &self,
        tx: &mut T,
        order_id: OrderId,
        customer_id: CustomerId,
        amount: Money,
        method: PaymentType,
    ) -> Result<PaymentOutcome>
    where
        T: Transaction,
    {
        let order = tx
            .get_order(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;
        if order.customer_id != customer_id {
            return Err(PaymentError::OrderNotPayable {
                order_id,
                reason: "order belongs to another customer".to_string(),
            });
        }
        if !order.status.accepts_payment() {
            return Err(PaymentError::OrderNotPayable {
                order_id,
                reason: format!("order is {}", order.status),
            });
        }
        if !amount.approx_eq(order.total_price, AMOUNT_TOLERANCE_CENTS) {
            return Err(PaymentError::AmountMismatch {
                expected: order.total_price,
                actual: amount,
            });
        }

        let existing = tx.list_payments_for_order(order_id).await?;
        if existing.iter().any(|p| p.status.is_refundable()) {
            return Err(PaymentError::AlreadyPaid(order_id));
        }
        if existing.iter().any(|p| p.status == PaymentStatus::Pending) {
            return Err(PaymentError::PaymentPending(order_id));
        }

        let mut payment = Payment::pending_for(&order, method);
        let mut order_status = order.status;
        let mut client_secret = None;

        match method {
            PaymentType::Cash => {
                if order.status == OrderStatus::Pending {
                    tx.update_order_status(order_id, OrderStatus::Pending, OrderStatus::Confirmed)
                        .await?;
                    order_status = OrderStatus::Confirmed;
                }
            }
            PaymentType::Card => match &self.card_provider {
                Some(provider) => {
                    match provider
                        .create_payment_intent(order_id, order.total_price, &self.settings.currency)
                        .await
                    {
                        Ok(intent) => {
                            payment.provider = Some(ProviderMetadata {
                                provider: provider.name().to_string(),
                                transaction_id: intent.provider_transaction_id,
                            });
                            client_secret = Some(intent.client_secret);
                        }
                        Err(e) if self.settings.card_fallback_to_pending => {
                            tracing::warn!(
                                %order_id,
                                error = %e,
                                "Card provider failed, recording payment as requiring action"
                            );
                            payment.requires_action = true;
                        }
                        Err(e) => return Err(PaymentError::ProviderUnavailable(e)),
                    }
                }
                None => payment.requires_action = true,
            },
            other => return Err(PaymentError::UnsupportedMethod(other)),
        }

        if let Err(e) = tx.insert_payment(&payment).await {
            self.release_intent(&payment).await;
            return Err(completion_conflict(order_id)(e));
        }

        metrics::counter!("payments_processed_total", "method" => method.as_str()).increment(1);
        tracing::info!(
            payment_id = %payment.id,
            %order_id,
            method = %method,
            requires_action = payment.requires_action,
            "Payment recorded"
        );

        Ok(PaymentOutcome {
            payment,
            order_status,
            client_secret,
        })
    }

    /// Cancels the provider intent behind a payment that was never committed.
    ///
    /// A failed cancellation is logged with the provider reference for
    /// reconciliation.
    pub(crate) async fn release_intent(&self, payment: &Payment) {
        let (Some(provider), Some(meta)) = (&self.card_provider, &payment.provider) else {
            return;
        };
        match provider.cancel_payment_intent(&meta.transaction_id).await {
            Ok(()) => tracing::info!(
                order_id = %payment.order_id,
                provider_transaction_id = %meta.transaction_id,
                "Released card intent after rollback"
            ),
            Err(e) => tracing::error!(
                order_id = %payment.order_id,
                provider_transaction_id = %meta.transaction_id,
                error = %e,
                "Card intent left open after rollback"
            ),
        }
    }

    async fn complete_in<T>(&self, tx: &mut T, mut payment: Payment) -> Result<Payment>
    where
        T: Transaction,
    {
        if payment.status.is_refundable() {
            return Err(PaymentError::AlreadyPaid(payment.order_id));
        }
        let others = tx.list_payments_for_order(payment.order_id).await?;
        if others
            .iter()
            .any(|p| p.id != payment.id && p.status.is_refundable())
        {
            return Err(PaymentError::AlreadyPaid(payment.order_id));
        }

        let previous = payment.status;
        payment.complete()?;
        tx.update_payment(&payment, previous)
            .await
            .map_err(completion_conflict(payment.order_id))?;

        let order = tx
            .get_order(payment.order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(payment.order_id))?;
        if order.status == OrderStatus::Pending {
            tx.update_order_status(order.id, OrderStatus::Pending, OrderStatus::Confirmed)
                .await?;
        }

        tracing::info!(payment_id = %payment.id, order_id = %payment.order_id, "Payment completed");
        Ok(payment)
    }

    /// Marks a pending payment as collected.
    #[tracing::instrument(skip(self))]
    pub async fn complete_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let mut tx = self.db.begin().await?;
        let payment = tx
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;
        let payment = self.complete_in(&mut tx, payment).await?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Applies a card provider callback.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_card_payment(
        &self,
        provider_transaction_id: &str,
        succeeded: bool,
    ) -> Result<Payment> {
        let mut tx = self.db.begin().await?;
        let mut payment = tx
            .find_payment_by_provider_ref(provider_transaction_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(provider_transaction_id.to_string()))?;

        let payment = if succeeded {
            self.complete_in(&mut tx, payment).await?
        } else {
            let previous = payment.status;
            payment.fail()?;
            tx.update_payment(&payment, previous).await?;
            tracing::info!(payment_id = %payment.id, "Card payment failed");
            payment
        };
        tx.commit().await?;
        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let mut tx = self.db.begin().await?;
        let mut payment = tx
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;
        let previous = payment.status;
        payment.cancel()?;
        tx.update_payment(&payment, previous).await?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Refunds part or all of a captured payment.
    ///
    /// Cumulative refunds never exceed the payment amount. Whether the order is
    /// cancelled follows the configured [`RefundPolicy`].
    #[tracing::instrument(skip(self, reason))]
    pub async fn process_refund(
        &self,
        payment_id: PaymentId,
        amount: Money,
        reason: Option<String>,
    ) -> Result<RefundReceipt> {
        let mut tx = self.db.begin().await?;
        let mut payment = tx
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;

        let previous = payment.status;
        let outcome = payment.refund(amount, reason)?;
        tx.update_payment(&payment, previous).await?;

        let order = tx
            .get_order(payment.order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(payment.order_id))?;
        let cancel = match self.settings.refund_policy {
            RefundPolicy::CancelOnAnyRefund => true,
            RefundPolicy::CancelOnFullRefund => outcome == RefundOutcome::Full,
        };
        let mut order_status = order.status;
        if cancel && order.status.can_transition_to(OrderStatus::Cancelled) {
            tx.update_order_status(order.id, order.status, OrderStatus::Cancelled)
                .await?;
            order_status = OrderStatus::Cancelled;
        } else if cancel && order.status != OrderStatus::Cancelled {
            tracing::info!(
                order_id = %order.id,
                status = %order.status,
                "Refunded order cannot be cancelled from its current status"
            );
        }

        tx.commit().await?;

        metrics::counter!("refunds_total").increment(1);
        tracing::info!(
            %payment_id,
            amount = %amount,
            refunded = %payment.refunded_amount,
            "Refund processed"
        );
        Ok(RefundReceipt {
            payment,
            outcome,
            order_status,
        })
    }

    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let mut tx = self.db.begin().await?;
        tx.get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))
    }

    pub async fn list_order_payments(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let mut tx = self.db.begin().await?;
        Ok(tx.list_payments_for_order(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use common::{CommissionRate, ProductId};
    use domain::{FulfillmentMethod, NewOrder, Order, OrderLine};
    use store::{FailPoint, InMemoryDatabase};

    use super::*;
    use crate::services::InMemoryCardProvider;

    struct Fixture {
        db: InMemoryDatabase,
        provider: InMemoryCardProvider,
        payments: PaymentProcessor<InMemoryDatabase>,
    }

    impl Fixture {
        fn new(with_provider: bool, settings: CheckoutSettings) -> Self {
            let db = InMemoryDatabase::new();
            let provider = InMemoryCardProvider::new();
            let card: Option<Arc<dyn CardPaymentProvider>> = if with_provider {
                Some(Arc::new(provider.clone()))
            } else {
                None
            };
            Self {
                payments: PaymentProcessor::new(db.clone(), card, settings),
                db,
                provider,
            }
        }

        async fn order(&self, total_major: i64) -> Order {
            let order = Order::assemble(
                NewOrder {
                    customer_id: CustomerId::new(),
                    tailor_id: None,
                    description: "Abaya x1".to_string(),
                    fulfillment: FulfillmentMethod::Delivery,
                    shipping_address: Some("Giza".to_string()),
                    due_date: None,
                },
                vec![OrderLine {
                    product_id: Some(ProductId::new()),
                    description: "Abaya".to_string(),
                    quantity: 1,
                    unit_price: Money::from_major(total_major),
                }],
                CommissionRate::default(),
            )
            .unwrap();
            let mut tx = self.db.begin().await.unwrap();
            tx.insert_order(&order).await.unwrap();
            tx.commit().await.unwrap();
            order
        }

        async fn order_status(&self, id: OrderId) -> OrderStatus {
            let mut tx = self.db.begin().await.unwrap();
            tx.get_order(id).await.unwrap().unwrap().status
        }

        async fn paid_order(&self, total_major: i64) -> (Order, Payment) {
            let order = self.order(total_major).await;
            let outcome = self
                .payments
                .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Cash)
                .await
                .unwrap();
            let payment = self
                .payments
                .complete_payment(outcome.payment.id)
                .await
                .unwrap();
            (order, payment)
        }
    }

    #[tokio::test]
    async fn test_cash_payment_confirms_order() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let order = f.order(100).await;

        let outcome = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Cash)
            .await
            .unwrap();

        assert_eq!(outcome.payment.status, PaymentStatus::Pending);
        assert!(!outcome.payment.requires_action);
        assert_eq!(outcome.order_status, OrderStatus::Confirmed);
        assert_eq!(f.order_status(order.id).await, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_amount_within_one_cent_is_accepted() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let order = f.order(100).await;

        let err = f
            .payments
            .process_payment(
                order.id,
                order.customer_id,
                Money::from_cents(9_998),
                PaymentType::Cash,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AmountMismatch { .. }));

        f.payments
            .process_payment(
                order.id,
                order.customer_id,
                Money::from_cents(9_999),
                PaymentType::Cash,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_order_of_other_customer_is_not_payable() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let order = f.order(100).await;
        let err = f
            .payments
            .process_payment(order.id, CustomerId::new(), order.total_price, PaymentType::Cash)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::OrderNotPayable { .. }));
    }

    #[tokio::test]
    async fn test_card_without_provider_requires_action() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let order = f.order(100).await;

        let outcome = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Card)
            .await
            .unwrap();
        assert_eq!(outcome.payment.status, PaymentStatus::Pending);
        assert!(outcome.payment.requires_action);
        assert!(outcome.client_secret.is_none());
        assert_eq!(outcome.order_status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_card_with_provider_then_webhook() {
        let f = Fixture::new(true, CheckoutSettings::default());
        let order = f.order(100).await;

        let outcome = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Card)
            .await
            .unwrap();
        assert_eq!(outcome.client_secret.as_deref(), Some("pi_0001_secret"));
        assert_eq!(f.provider.intent_count(), 1);
        assert_eq!(f.order_status(order.id).await, OrderStatus::Pending);

        let completed = f
            .payments
            .confirm_card_payment("pi_0001", true)
            .await
            .unwrap();
        assert_eq!(completed.status, PaymentStatus::Completed);
        assert!(completed.paid_at.is_some());
        assert_eq!(f.order_status(order.id).await, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_failed_card_webhook() {
        let f = Fixture::new(true, CheckoutSettings::default());
        let order = f.order(100).await;
        f.payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Card)
            .await
            .unwrap();

        let failed = f
            .payments
            .confirm_card_payment("pi_0001", false)
            .await
            .unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);

        assert!(matches!(
            f.payments.confirm_card_payment("pi_9999", true).await,
            Err(PaymentError::PaymentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_follows_fallback_setting() {
        let f = Fixture::new(true, CheckoutSettings::default());
        f.provider.set_fail_on_create(true);
        let order = f.order(100).await;
        let outcome = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Card)
            .await
            .unwrap();
        assert!(outcome.payment.requires_action);

        let strict = CheckoutSettings {
            card_fallback_to_pending: false,
            ..Default::default()
        };
        let f = Fixture::new(true, strict);
        f.provider.set_fail_on_create(true);
        let order = f.order(100).await;
        let err = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Card)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ProviderUnavailable(_)));
        assert_eq!(f.db.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_commit_cancels_card_intent() {
        let f = Fixture::new(true, CheckoutSettings::default());
        let order = f.order(100).await;

        f.db.set_fail_on(FailPoint::Commit, true);
        let err = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Card)
            .await
            .unwrap_err();
        f.db.set_fail_on(FailPoint::Commit, false);

        assert!(matches!(err, PaymentError::Store(_)));
        assert_eq!(f.provider.cancelled(), vec!["pi_0001".to_string()]);
        assert_eq!(f.provider.intent_count(), 0);
        assert_eq!(f.db.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsupported_methods() {
        let f = Fixture::new(true, CheckoutSettings::default());
        let order = f.order(100).await;
        for method in [PaymentType::Wallet, PaymentType::BankTransfer, PaymentType::Other] {
            let err = f
                .payments
                .process_payment(order.id, order.customer_id, order.total_price, method)
                .await
                .unwrap_err();
            assert!(matches!(err, PaymentError::UnsupportedMethod(m) if m == method));
        }
    }

    #[tokio::test]
    async fn test_second_submission_while_pending() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let order = f.order(100).await;
        f.payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Cash)
            .await
            .unwrap();

        let err = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Cash)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::PaymentPending(_)));
    }

    #[tokio::test]
    async fn test_double_submit_after_completion_is_already_paid() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let (order, payment) = f.paid_order(100).await;
        assert_eq!(payment.status, PaymentStatus::Completed);

        let err = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Cash)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyPaid(id) if id == order.id));

        let err = f.payments.complete_payment(payment.id).await.unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyPaid(_)));
    }

    #[tokio::test]
    async fn test_cancel_pending_payment() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let order = f.order(100).await;
        let outcome = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Cash)
            .await
            .unwrap();

        let cancelled = f.payments.cancel_payment(outcome.payment.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);

        let err = f.payments.cancel_payment(outcome.payment.id).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_refund_exceeding_payment_leaves_it_unchanged() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let (order, payment) = f.paid_order(200).await;

        let err = f
            .payments
            .process_refund(payment.id, Money::from_major(250), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::RefundExceedsPayment { .. }));

        let stored = f.payments.get_payment(payment.id).await.unwrap();
        assert_eq!(stored, payment);
        assert_eq!(f.order_status(order.id).await, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_partial_refund_cancels_order_by_default() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let (order, payment) = f.paid_order(200).await;

        let receipt = f
            .payments
            .process_refund(payment.id, Money::from_major(50), Some("Late".to_string()))
            .await
            .unwrap();
        assert_eq!(receipt.outcome, RefundOutcome::Partial);
        assert_eq!(receipt.payment.status, PaymentStatus::PartiallyPaid);
        assert_eq!(receipt.order_status, OrderStatus::Cancelled);
        assert_eq!(f.order_status(order.id).await, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_full_refund_policy_keeps_order_on_partial_refund() {
        let settings = CheckoutSettings {
            refund_policy: RefundPolicy::CancelOnFullRefund,
            ..Default::default()
        };
        let f = Fixture::new(false, settings);
        let (order, payment) = f.paid_order(200).await;

        let receipt = f
            .payments
            .process_refund(payment.id, Money::from_major(50), None)
            .await
            .unwrap();
        assert_eq!(receipt.order_status, OrderStatus::Confirmed);

        let receipt = f
            .payments
            .process_refund(payment.id, Money::from_major(150), None)
            .await
            .unwrap();
        assert_eq!(receipt.outcome, RefundOutcome::Full);
        assert_eq!(receipt.payment.status, PaymentStatus::Refunded);
        assert_eq!(f.order_status(order.id).await, OrderStatus::Cancelled);

        let err = f
            .payments
            .process_refund(payment.id, Money::from_cents(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_refund_of_pending_payment_is_rejected() {
        let f = Fixture::new(false, CheckoutSettings::default());
        let order = f.order(100).await;
        let outcome = f
            .payments
            .process_payment(order.id, order.customer_id, order.total_price, PaymentType::Cash)
            .await
            .unwrap();

        let err = f
            .payments
            .process_refund(outcome.payment.id, Money::from_major(10), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidTransition { .. }));
    }
}
