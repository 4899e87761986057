//! Order status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► InProgress ──┬──► ReadyForPickup ──► Delivered
///    │            │             │        └──────────────────────► Delivered
///    └────────────┴─────────────┴──────────► Cancelled
/// ```
/// `ReadyForPickup` may also be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Created, awaiting payment confirmation.
    #[default]
    Pending,

    /// Payment arranged (cash on delivery or card confirmed).
    Confirmed,

    /// The tailor is working on the order.
    InProgress,

    /// Waiting at the shop for the customer.
    ReadyForPickup,

    /// Handed over to the customer (terminal state).
    Delivered,

    /// Cancelled by an admin, tailor or a refund (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order may move directly to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, Cancelled)
                | (InProgress, ReadyForPickup)
                | (InProgress, Delivered)
                | (InProgress, Cancelled)
                | (ReadyForPickup, Delivered)
                | (ReadyForPickup, Cancelled)
        )
    }

    /// Returns true if a payment may still be taken for the order.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::InProgress => "InProgress",
            OrderStatus::ReadyForPickup => "ReadyForPickup",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Confirmed" => Ok(OrderStatus::Confirmed),
            "InProgress" => Ok(OrderStatus::InProgress),
            "ReadyForPickup" => Ok(OrderStatus::ReadyForPickup),
            "Delivered" => Ok(OrderStatus::Delivered),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::UnknownVariant {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::InProgress,
        OrderStatus::ReadyForPickup,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_pending_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_accepts_payment() {
        assert!(OrderStatus::Pending.accepts_payment());
        assert!(OrderStatus::Confirmed.accepts_payment());
        assert!(!OrderStatus::InProgress.accepts_payment());
        assert!(!OrderStatus::Cancelled.accepts_payment());
        assert!(!OrderStatus::Delivered.accepts_payment());
    }

    #[test]
    fn test_string_roundtrip() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("Open".parse::<OrderStatus>().is_err());
    }
}
