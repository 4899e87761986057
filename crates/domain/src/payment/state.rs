//! Payment state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of a payment.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed ──┬──► Refunded
///           │                └──► PartiallyPaid ──► Refunded
///           ├──► Failed
///           └──► Cancelled
/// ```
/// `Failed`, `Cancelled` and `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
    /// Completed, then partially refunded.
    PartiallyPaid,
}

impl PaymentStatus {
    /// Returns true if the payment may move directly to `next`.
    ///
    /// `PartiallyPaid -> PartiallyPaid` covers a further partial refund.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Completed, Refunded)
                | (Completed, PartiallyPaid)
                | (PartiallyPaid, PartiallyPaid)
                | (PartiallyPaid, Refunded)
        )
    }

    /// Returns true if money has been captured and may be refunded.
    pub fn is_refundable(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::PartiallyPaid)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
            PaymentStatus::Cancelled => "Cancelled",
            PaymentStatus::PartiallyPaid => "PartiallyPaid",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Completed" => Ok(PaymentStatus::Completed),
            "Failed" => Ok(PaymentStatus::Failed),
            "Refunded" => Ok(PaymentStatus::Refunded),
            "Cancelled" => Ok(PaymentStatus::Cancelled),
            "PartiallyPaid" => Ok(PaymentStatus::PartiallyPaid),
            other => Err(DomainError::UnknownVariant {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}
