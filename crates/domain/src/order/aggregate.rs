//! Order and order item records.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{CommissionRate, CustomerId, Money, OrderId, OrderItemId, ProductId, TailorId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::error::DomainError;

/// How the finished order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FulfillmentMethod {
    #[default]
    Delivery,
    Pickup,
}

impl FulfillmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentMethod::Delivery => "Delivery",
            FulfillmentMethod::Pickup => "Pickup",
        }
    }
}

impl FromStr for FulfillmentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Delivery" => Ok(FulfillmentMethod::Delivery),
            "Pickup" => Ok(FulfillmentMethod::Pickup),
            other => Err(DomainError::UnknownVariant {
                kind: "fulfillment method",
                value: other.to_string(),
            }),
        }
    }
}

/// A priced line to be turned into an [`OrderItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    /// `None` for bespoke tailoring work.
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Header fields for a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub tailor_id: Option<TailorId>,
    pub description: String,
    pub fulfillment: FulfillmentMethod,
    pub shipping_address: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// One immutable line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
}

impl OrderItem {
    /// Creates an item with `total = unit_price * quantity`.
    pub fn new(order_id: OrderId, line: OrderLine) -> Result<Self, DomainError> {
        if line.quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity: 0 });
        }
        if !line.unit_price.is_positive() {
            return Err(DomainError::InvalidPrice {
                price: line.unit_price,
            });
        }
        let total = line
            .unit_price
            .checked_mul(line.quantity)
            .ok_or(DomainError::AmountOverflow)?;
        Ok(Self {
            id: OrderItemId::new(),
            order_id,
            product_id: line.product_id,
            description: line.description,
            quantity: line.quantity,
            unit_price: line.unit_price,
            total,
        })
    }

    /// Checks the stored total against unit price times quantity.
    pub fn verify(&self) -> Result<(), DomainError> {
        let expected = self
            .unit_price
            .checked_mul(self.quantity)
            .ok_or(DomainError::AmountOverflow)?;
        if expected != self.total {
            return Err(DomainError::ItemTotalMismatch {
                expected,
                actual: self.total,
            });
        }
        Ok(())
    }
}

/// An order placed by a customer with one tailor (or the platform).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub tailor_id: Option<TailorId>,
    pub description: String,
    pub total_price: Money,
    pub commission_rate: CommissionRate,
    pub commission_amount: Money,
    pub status: OrderStatus,
    pub fulfillment: FulfillmentMethod,
    pub shipping_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Builds a `Pending` order from priced lines and applies the commission.
    pub fn assemble(
        header: NewOrder,
        lines: Vec<OrderLine>,
        commission_rate: CommissionRate,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::OrderHasNoItems);
        }

        let id = OrderId::new();
        let items = lines
            .into_iter()
            .map(|line| OrderItem::new(id, line))
            .collect::<Result<Vec<_>, _>>()?;
        let total_price =
            Money::checked_sum(items.iter().map(|i| i.total)).ok_or(DomainError::AmountOverflow)?;

        let order = Self {
            id,
            customer_id: header.customer_id,
            tailor_id: header.tailor_id,
            description: header.description,
            total_price,
            commission_rate,
            commission_amount: commission_rate.apply(total_price),
            status: OrderStatus::Pending,
            fulfillment: header.fulfillment,
            shipping_address: match header.fulfillment {
                FulfillmentMethod::Delivery => header.shipping_address,
                FulfillmentMethod::Pickup => None,
            },
            created_at: Utc::now(),
            due_date: header.due_date,
            items,
        };
        order.verify_totals()?;
        Ok(order)
    }

    /// Re-checks every item total and the order total against its items.
    pub fn verify_totals(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::OrderHasNoItems);
        }
        for item in &self.items {
            item.verify()?;
        }
        let expected = Money::checked_sum(self.items.iter().map(|i| i.total))
            .ok_or(DomainError::AmountOverflow)?;
        if expected != self.total_price {
            return Err(DomainError::OrderTotalMismatch {
                expected,
                actual: self.total_price,
            });
        }
        Ok(())
    }

    /// Moves the order to `next` if the state machine allows it.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidOrderTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> NewOrder {
        NewOrder {
            customer_id: CustomerId::new(),
            tailor_id: Some(TailorId::new()),
            description: "Store order".to_string(),
            fulfillment: FulfillmentMethod::Delivery,
            shipping_address: Some("12 Nile St, Cairo".to_string()),
            due_date: None,
        }
    }

    fn line(quantity: u32, unit_cents: i64) -> OrderLine {
        OrderLine {
            product_id: Some(ProductId::new()),
            description: "Kaftan".to_string(),
            quantity,
            unit_price: Money::from_cents(unit_cents),
        }
    }

    #[test]
    fn test_assemble_computes_totals_and_commission() {
        let order = Order::assemble(
            header(),
            vec![line(2, 5_000), line(1, 10_000)],
            CommissionRate::default(),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price, Money::from_major(200));
        assert_eq!(order.commission_amount, Money::from_major(20));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].total, Money::from_major(100));
        assert_eq!(order.item_count(), 3);
        assert!(order.items.iter().all(|i| i.order_id == order.id));
    }

    #[test]
    fn test_assemble_rejects_overflowing_totals() {
        let result = Order::assemble(
            header(),
            vec![line(4_000_000_000, 10_000_000_000)],
            CommissionRate::default(),
        );
        assert_eq!(result, Err(DomainError::AmountOverflow));

        let result = Order::assemble(
            header(),
            vec![line(1, i64::MAX), line(1, 1)],
            CommissionRate::default(),
        );
        assert_eq!(result, Err(DomainError::AmountOverflow));
    }

    #[test]
    fn test_pickup_orders_drop_the_address() {
        let mut pickup = header();
        pickup.fulfillment = FulfillmentMethod::Pickup;
        let order = Order::assemble(pickup, vec![line(1, 100)], CommissionRate::default()).unwrap();
        assert_eq!(order.shipping_address, None);

        let order = Order::assemble(header(), vec![line(1, 100)], CommissionRate::default()).unwrap();
        assert_eq!(order.shipping_address.as_deref(), Some("12 Nile St, Cairo"));
    }

    #[test]
    fn test_assemble_rejects_empty_lines() {
        let result = Order::assemble(header(), vec![], CommissionRate::default());
        assert_eq!(result, Err(DomainError::OrderHasNoItems));
    }

    #[test]
    fn test_assemble_rejects_zero_quantity() {
        let result = Order::assemble(header(), vec![line(0, 100)], CommissionRate::default());
        assert_eq!(result, Err(DomainError::InvalidQuantity { quantity: 0 }));
    }

    #[test]
    fn test_verify_detects_tampered_item_total() {
        let mut order =
            Order::assemble(header(), vec![line(2, 5_000)], CommissionRate::default()).unwrap();
        order.items[0].total = Money::from_cents(9_999);

        assert!(matches!(
            order.verify_totals(),
            Err(DomainError::ItemTotalMismatch { .. })
        ));
    }

    #[test]
    fn test_verify_detects_tampered_order_total() {
        let mut order =
            Order::assemble(header(), vec![line(2, 5_000)], CommissionRate::default()).unwrap();
        order.total_price = Money::from_major(1);

        assert_eq!(
            order.verify_totals(),
            Err(DomainError::OrderTotalMismatch {
                expected: Money::from_major(100),
                actual: Money::from_major(1),
            })
        );
    }

    #[test]
    fn test_transition_follows_state_machine() {
        let mut order =
            Order::assemble(header(), vec![line(1, 100)], CommissionRate::default()).unwrap();

        order.transition_to(OrderStatus::Confirmed).unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);

        let err = order.transition_to(OrderStatus::Pending).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidOrderTransition {
                from: OrderStatus::Confirmed,
                to: OrderStatus::Pending,
            }
        );
    }

    #[test]
    fn test_order_serialization() {
        let order =
            Order::assemble(header(), vec![line(1, 100)], CommissionRate::default()).unwrap();
        let json = serde_json::to_string(&order).unwrap();
        let deserialized: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, deserialized);
    }
}
