//! Checkout orchestration: cart to orders to payments in one transaction.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{CustomerId, Money, OrderId, PaymentId, UserId};
use domain::{DomainError, FulfillmentMethod, Order, PaymentType};
use serde::{Deserialize, Serialize};
use store::{CartStore, Database, IdempotencyStore, StoreError, Transaction};

use crate::error::{CheckoutError, Result};
use crate::orders::{OrderAssembly, ShippingInfo};
use crate::payment::{PaymentOutcome, PaymentProcessor};
use crate::services::{CardPaymentProvider, Notifier, ProfileDirectory};
use crate::settings::CheckoutSettings;

/// A request to check out the caller's active cart.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub payment_method: PaymentType,
    pub shipping_address: String,
    pub fulfillment: FulfillmentMethod,
    /// Replays the stored confirmation when the same key is submitted again.
    pub idempotency_key: Option<String>,
}

/// What the customer has to do after a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NextStep {
    /// Nothing; the orders are confirmed (cash on delivery or pickup).
    Confirmed,
    /// Finish the card flow with the provider using these tokens.
    CardRedirect {
        #[serde(rename = "clientSecrets")]
        client_secrets: Vec<String>,
        /// Orders whose card payment could not be started with the provider.
        #[serde(
            rename = "requiresAction",
            default,
            skip_serializing_if = "Vec::is_empty"
        )]
        requires_action: Vec<OrderId>,
    },
    /// The card payment could not be started automatically.
    RequiresAction,
}

/// The result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub order_ids: Vec<OrderId>,
    pub payment_ids: Vec<PaymentId>,
    /// Customer-facing reference, e.g. `TS-1A2B3C4D`.
    pub order_number: String,
    pub total_amount: Money,
    pub payment_method: PaymentType,
    pub next_step: NextStep,
}

/// Builds the customer-facing order number from the first order's id.
pub fn order_number(first: OrderId) -> String {
    let hex = first.as_uuid().simple().to_string();
    format!("TS-{}", hex[..8].to_uppercase())
}

fn next_step(method: PaymentType, outcomes: &[PaymentOutcome]) -> NextStep {
    if method == PaymentType::Cash {
        return NextStep::Confirmed;
    }
    let mut client_secrets = Vec::new();
    let mut requires_action = Vec::new();
    for outcome in outcomes {
        match &outcome.client_secret {
            Some(secret) => client_secrets.push(secret.clone()),
            None => requires_action.push(outcome.payment.order_id),
        }
    }
    if client_secrets.is_empty() {
        NextStep::RequiresAction
    } else {
        NextStep::CardRedirect {
            client_secrets,
            requires_action,
        }
    }
}

fn idempotency_scope(user_id: UserId, key: &str) -> String {
    format!("checkout:{user_id}:{key}")
}

/// Drives a checkout from validation to notification.
#[derive(Clone)]
pub struct CheckoutService<D: Database> {
    db: D,
    settings: CheckoutSettings,
    profiles: Arc<dyn ProfileDirectory>,
    notifier: Arc<dyn Notifier>,
    assembly: OrderAssembly<D>,
    payments: PaymentProcessor<D>,
}

impl<D: Database> CheckoutService<D> {
    pub fn new(
        db: D,
        settings: CheckoutSettings,
        profiles: Arc<dyn ProfileDirectory>,
        card_provider: Option<Arc<dyn CardPaymentProvider>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            assembly: OrderAssembly::new(db.clone(), settings.commission_rate),
            payments: PaymentProcessor::new(db.clone(), card_provider, settings.clone()),
            db,
            settings,
            profiles,
            notifier,
        }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Checks out the caller's active cart.
    ///
    /// Stock, orders, payments and the emptied cart are committed together or
    /// not at all. The notifier runs after commit and cannot fail the checkout.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, method = %request.payment_method))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<OrderConfirmation> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let start = Instant::now();

        let result = self.run(&request).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(confirmation) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_number = %confirmation.order_number,
                    orders = confirmation.order_ids.len(),
                    total = %confirmation.total_amount,
                    "Checkout completed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "kind" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(error = %e, kind = %e.kind(), "Checkout failed");
            }
        }
        result
    }

    async fn run(&self, request: &CheckoutRequest) -> Result<OrderConfirmation> {
        let address = request.shipping_address.trim();
        if request.fulfillment == FulfillmentMethod::Delivery && address.is_empty() {
            return Err(CheckoutError::InvalidShippingAddress);
        }
        if !matches!(request.payment_method, PaymentType::Cash | PaymentType::Card) {
            return Err(CheckoutError::UnsupportedPaymentMethod(
                request.payment_method,
            ));
        }

        let customer_id = self
            .profiles
            .customer_profile(request.user_id)
            .await?
            .ok_or(CheckoutError::CustomerProfileNotFound(request.user_id))?;

        let mut tx = self.db.begin().await?;

        let scope = request
            .idempotency_key
            .as_deref()
            .map(|key| idempotency_scope(request.user_id, key));
        if let Some(scope) = &scope {
            if let Some(stored) = tx.get_idempotency_record(scope).await? {
                tracing::info!(idempotency_key = %scope, "Replaying stored checkout");
                return Ok(serde_json::from_value(stored)?);
            }
        }

        let cart = tx
            .find_active_cart(customer_id)
            .await?
            .filter(|c| !c.is_expired(Utc::now()))
            .ok_or(CheckoutError::EmptyCart)?;

        let shipping = ShippingInfo {
            address: address.to_string(),
            fulfillment: request.fulfillment,
        };
        let orders = self
            .assembly
            .assemble_in(&mut tx, customer_id, cart.id, &shipping)
            .await?;

        let mut outcomes = Vec::with_capacity(orders.len());
        let result = self
            .settle(tx, request, customer_id, &orders, scope.as_deref(), &mut outcomes)
            .await;
        match result {
            Ok(confirmation) => {
                self.notify(confirmation.clone());
                Ok(confirmation)
            }
            Err(e) => {
                for outcome in &outcomes {
                    self.payments.release_intent(&outcome.payment).await;
                }
                Err(e)
            }
        }
    }

    /// Opens one payment per order, stores the idempotent response and commits.
    ///
    /// Outcomes are pushed as they are created; the caller releases their
    /// provider intents when anything after them fails.
    async fn settle(
        &self,
        mut tx: D::Tx,
        request: &CheckoutRequest,
        customer_id: CustomerId,
        orders: &[Order],
        scope: Option<&str>,
        outcomes: &mut Vec<PaymentOutcome>,
    ) -> Result<OrderConfirmation> {
        for order in orders {
            let outcome = self
                .payments
                .process_in(
                    &mut tx,
                    order.id,
                    customer_id,
                    order.total_price,
                    request.payment_method,
                )
                .await?;
            outcomes.push(outcome);
        }

        let confirmation = confirmation(orders, outcomes, request.payment_method)?;

        if let Some(scope) = scope {
            let value = serde_json::to_value(&confirmation)?;
            tx.save_idempotency_record(scope, &value)
                .await
                .map_err(|e| match e {
                    StoreError::Duplicate(_) => {
                        CheckoutError::Store(StoreError::Duplicate(format!(
                            "checkout already submitted with key {scope}"
                        )))
                    }
                    other => other.into(),
                })?;
        }

        tx.commit().await?;
        Ok(confirmation)
    }

    fn notify(&self, confirmation: OrderConfirmation) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.order_placed(&confirmation).await {
                tracing::warn!(
                    order_number = %confirmation.order_number,
                    error = %e,
                    "Order notification failed"
                );
            }
        });
    }
}

fn confirmation(
    orders: &[Order],
    outcomes: &[PaymentOutcome],
    method: PaymentType,
) -> Result<OrderConfirmation> {
    let order_ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
    let total_amount = Money::checked_sum(orders.iter().map(|o| o.total_price))
        .ok_or(DomainError::AmountOverflow)?;
    Ok(OrderConfirmation {
        order_number: order_ids
            .first()
            .map(|id| order_number(*id))
            .unwrap_or_default(),
        order_ids,
        payment_ids: outcomes.iter().map(|o| o.payment.id).collect(),
        total_amount,
        payment_method: method,
        next_step: next_step(method, outcomes),
    })
}
