//! Tunable business settings shared by the services.

use std::str::FromStr;

use chrono::Duration;
use common::CommissionRate;

/// Which refunds cancel the refunded order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefundPolicy {
    /// Any refund, partial or full, cancels the order.
    #[default]
    CancelOnAnyRefund,
    /// Only a refund that empties the payment cancels the order.
    CancelOnFullRefund,
}

impl FromStr for RefundPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(RefundPolicy::CancelOnAnyRefund),
            "full" => Ok(RefundPolicy::CancelOnFullRefund),
            other => Err(format!("unknown refund policy '{other}', expected 'any' or 'full'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub commission_rate: CommissionRate,
    /// Inactivity window after which a cart is replaced.
    pub cart_ttl: Duration,
    /// ISO currency code passed to the card provider.
    pub currency: String,
    /// Record a card payment as `Pending`/`requires_action` when the provider
    /// fails, instead of failing the checkout.
    pub card_fallback_to_pending: bool,
    pub refund_policy: RefundPolicy,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            commission_rate: CommissionRate::default(),
            cart_ttl: Duration::hours(168),
            currency: "EGP".to_string(),
            card_fallback_to_pending: true,
            refund_policy: RefundPolicy::default(),
        }
    }
}
