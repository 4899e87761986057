//! Payment record and refund rules.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, PaymentId, TailorId};
use serde::{Deserialize, Serialize};

use super::PaymentStatus;
use crate::error::DomainError;
use crate::order::Order;

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentType {
    Cash,
    Card,
    Wallet,
    BankTransfer,
    Other,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Cash => "Cash",
            PaymentType::Card => "Card",
            PaymentType::Wallet => "Wallet",
            PaymentType::BankTransfer => "BankTransfer",
            PaymentType::Other => "Other",
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cash" => Ok(PaymentType::Cash),
            "Card" => Ok(PaymentType::Card),
            "Wallet" => Ok(PaymentType::Wallet),
            "BankTransfer" => Ok(PaymentType::BankTransfer),
            "Other" => Ok(PaymentType::Other),
            other => Err(DomainError::UnknownVariant {
                kind: "payment type",
                value: other.to_string(),
            }),
        }
    }
}

/// Accounting direction of the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransactionType {
    #[default]
    Credit,
    Debit,
    Deposit,
    FinalPayment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "Credit",
            TransactionType::Debit => "Debit",
            TransactionType::Deposit => "Deposit",
            TransactionType::FinalPayment => "FinalPayment",
        }
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Credit" => Ok(TransactionType::Credit),
            "Debit" => Ok(TransactionType::Debit),
            "Deposit" => Ok(TransactionType::Deposit),
            "FinalPayment" => Ok(TransactionType::FinalPayment),
            other => Err(DomainError::UnknownVariant {
                kind: "transaction type",
                value: other.to_string(),
            }),
        }
    }
}

/// Card processor reference attached to a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub provider: String,
    pub transaction_id: String,
}

/// Whether a refund emptied the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    Full,
    Partial,
}

/// A payment attempt against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub tailor_id: Option<TailorId>,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub transaction_type: TransactionType,
    /// Set when completion needs a manual or provider step that has not happened yet.
    pub requires_action: bool,
    pub provider: Option<ProviderMetadata>,
    pub refunded_amount: Money,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a `Pending` payment for the full order total.
    pub fn pending_for(order: &Order, payment_type: PaymentType) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id: order.id,
            customer_id: order.customer_id,
            tailor_id: order.tailor_id,
            amount: order.total_price,
            payment_type,
            status: PaymentStatus::Pending,
            transaction_type: TransactionType::FinalPayment,
            requires_action: false,
            provider: None,
            refunded_amount: Money::zero(),
            refunded_at: None,
            refund_reason: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: PaymentStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidPaymentTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the money as captured.
    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Completed)?;
        self.requires_action = false;
        self.paid_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Failed)
    }

    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Cancelled)
    }

    /// Amount still available for refunds.
    pub fn refundable(&self) -> Money {
        self.amount
            .checked_sub(self.refunded_amount)
            .unwrap_or_else(Money::zero)
    }

    /// Refunds `amount`, never letting cumulative refunds exceed the payment.
    pub fn refund(
        &mut self,
        amount: Money,
        reason: Option<String>,
    ) -> Result<RefundOutcome, DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::InvalidRefundAmount { amount });
        }
        if !self.status.is_refundable() {
            return Err(DomainError::InvalidPaymentTransition {
                from: self.status,
                to: PaymentStatus::Refunded,
            });
        }
        let refundable = self.refundable();
        if amount > refundable {
            return Err(DomainError::RefundExceedsPayment {
                requested: amount,
                refundable,
            });
        }

        let outcome = if amount == refundable {
            RefundOutcome::Full
        } else {
            RefundOutcome::Partial
        };
        let next = match outcome {
            RefundOutcome::Full => PaymentStatus::Refunded,
            RefundOutcome::Partial => PaymentStatus::PartiallyPaid,
        };
        let refunded = self
            .refunded_amount
            .checked_add(amount)
            .ok_or(DomainError::AmountOverflow)?;
        self.transition(next)?;
        self.refunded_amount = refunded;
        self.refunded_at = Some(self.updated_at);
        if reason.is_some() {
            self.refund_reason = reason;
        }
        Ok(outcome)
    }
}
