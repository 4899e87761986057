//! Order assembly and the order lifecycle.

use chrono::{DateTime, Utc};
use common::{CartId, CommissionRate, CustomerId, Money, OrderId, ProductId, TailorId};
use domain::{FulfillmentMethod, NewOrder, Order, OrderLine, OrderStatus};
use store::{CartStore, CatalogStore, Database, OrderStore, StoreError, Transaction};

use crate::catalog::adjust_stock_in;
use crate::error::{CheckoutError, Result};

/// Where and how a cart order is delivered.
#[derive(Debug, Clone)]
pub struct ShippingInfo {
    pub address: String,
    pub fulfillment: FulfillmentMethod,
}

/// One line of a bespoke tailoring request.
#[derive(Debug, Clone)]
pub struct CustomItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A tailoring request placed directly with a tailor, without a cart.
#[derive(Debug, Clone)]
pub struct CustomOrderRequest {
    pub customer_id: CustomerId,
    pub tailor_id: TailorId,
    pub description: String,
    pub items: Vec<CustomItem>,
    pub due_date: Option<DateTime<Utc>>,
    pub fulfillment: FulfillmentMethod,
    pub shipping_address: Option<String>,
}

/// Lines of one order under construction, keyed by the owning tailor.
struct OrderGroup {
    tailor_id: Option<TailorId>,
    lines: Vec<OrderLine>,
}

fn order_description(lines: &[OrderLine]) -> String {
    let names: Vec<String> = lines
        .iter()
        .map(|l| format!("{} x{}", l.description, l.quantity))
        .collect();
    names.join(", ")
}

/// Converts carts into orders and manages order status.
#[derive(Clone)]
pub struct OrderAssembly<D: Database> {
    db: D,
    commission_rate: CommissionRate,
}

impl<D: Database> OrderAssembly<D> {
    pub fn new(db: D, commission_rate: CommissionRate) -> Self {
        Self {
            db,
            commission_rate,
        }
    }

    /// Turns the cart into orders inside an open transaction.
    ///
    /// Every line's stock is decremented first; any shortfall aborts the whole
    /// assembly. Unit prices come from the product rows returned by the
    /// decrement. Lines are grouped into one order per tailor, and the cart is
    /// emptied last so the removal commits together with the orders.
    pub async fn assemble_in<T>(
        &self,
        tx: &mut T,
        customer_id: CustomerId,
        cart_id: CartId,
        shipping: &ShippingInfo,
    ) -> Result<Vec<Order>>
    where
        T: Transaction,
    {
        let cart_lines = tx.list_cart_lines(cart_id).await?;
        if cart_lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut groups: Vec<OrderGroup> = Vec::new();
        let mut sold: Vec<(ProductId, u32)> = Vec::with_capacity(cart_lines.len());

        for line in &cart_lines {
            let product_id = line.item.product_id;
            let quantity = line.item.quantity;

            let before = tx
                .get_product(product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound(product_id))?;
            if before.is_deleted {
                return Err(CheckoutError::ProductUnavailable(product_id));
            }

            let delta = i32::try_from(quantity)
                .map_err(|_| CheckoutError::InvalidQuantity(i64::from(quantity)))?;
            let product = adjust_stock_in(tx, product_id, -delta).await?;
            if !before.is_available {
                return Err(CheckoutError::ProductUnavailable(product_id));
            }

            let order_line = OrderLine {
                product_id: Some(product_id),
                description: product.name.clone(),
                quantity,
                unit_price: product.effective_price(),
            };
            match groups.iter_mut().find(|g| g.tailor_id == product.tailor_id) {
                Some(group) => group.lines.push(order_line),
                None => groups.push(OrderGroup {
                    tailor_id: product.tailor_id,
                    lines: vec![order_line],
                }),
            }
            sold.push((product_id, quantity));
        }

        let mut orders = Vec::with_capacity(groups.len());
        for group in groups {
            let order = Order::assemble(
                NewOrder {
                    customer_id,
                    tailor_id: group.tailor_id,
                    description: order_description(&group.lines),
                    fulfillment: shipping.fulfillment,
                    shipping_address: Some(shipping.address.clone()),
                    due_date: None,
                },
                group.lines,
                self.commission_rate,
            )?;
            order.verify_totals()?;
            tx.insert_order(&order).await?;
            orders.push(order);
        }

        for (product_id, quantity) in sold {
            tx.record_sale(product_id, quantity).await?;
        }
        let removed = tx.clear_cart(cart_id).await?;
        if removed != cart_lines.len() as u64 {
            return Err(StoreError::stale("Cart", cart_id, "unchanged during checkout").into());
        }

        tracing::info!(
            %cart_id,
            orders = orders.len(),
            "Cart assembled into orders"
        );
        Ok(orders)
    }

    /// Places the orders for a customer's cart in its own transaction.
    #[tracing::instrument(skip(self, shipping))]
    pub async fn place_order(
        &self,
        customer_id: CustomerId,
        cart_id: CartId,
        shipping: &ShippingInfo,
    ) -> Result<Vec<Order>> {
        let mut tx = self.db.begin().await?;
        tx.get_cart(cart_id)
            .await?
            .filter(|c| c.customer_id == customer_id)
            .ok_or(CheckoutError::CartNotFound(cart_id))?;

        let orders = self
            .assemble_in(&mut tx, customer_id, cart_id, shipping)
            .await?;
        tx.commit().await?;
        Ok(orders)
    }

    /// Places a bespoke order. Items carry no product and do not touch stock.
    #[tracing::instrument(skip(self, request), fields(tailor_id = %request.tailor_id))]
    pub async fn place_custom_order(&self, request: CustomOrderRequest) -> Result<Order> {
        let lines = request
            .items
            .into_iter()
            .map(|item| OrderLine {
                product_id: None,
                description: item.description,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        let order = Order::assemble(
            NewOrder {
                customer_id: request.customer_id,
                tailor_id: Some(request.tailor_id),
                description: request.description,
                fulfillment: request.fulfillment,
                shipping_address: request.shipping_address,
                due_date: request.due_date,
            },
            lines,
            self.commission_rate,
        )?;

        let mut tx = self.db.begin().await?;
        tx.insert_order(&order).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, total = %order.total_price, "Custom order placed");
        Ok(order)
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        let mut tx = self.db.begin().await?;
        tx.get_order(id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(id))
    }

    pub async fn list_customer_orders(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let mut tx = self.db.begin().await?;
        Ok(tx.list_orders_for_customer(customer_id).await?)
    }

    /// Moves an order along its lifecycle.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, next: OrderStatus) -> Result<Order> {
        let mut tx = self.db.begin().await?;
        let mut order = tx
            .get_order(id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(id))?;
        let current = order.status;
        order.transition_to(next)?;
        tx.update_order_status(id, current, next).await?;
        tx.commit().await?;

        tracing::info!(order_id = %id, from = %current, to = %next, "Order status changed");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use domain::{DomainError, Product};
    use store::{FailPoint, InMemoryDatabase};

    use super::*;
    use crate::cart::CartService;

    struct Fixture {
        db: InMemoryDatabase,
        carts: CartService<InMemoryDatabase>,
        orders: OrderAssembly<InMemoryDatabase>,
        customer_id: CustomerId,
        cart_id: CartId,
    }

    impl Fixture {
        async fn new() -> Self {
            let db = InMemoryDatabase::new();
            let carts = CartService::new(db.clone(), chrono::Duration::hours(1));
            let orders = OrderAssembly::new(db.clone(), CommissionRate::default());
            let customer_id = CustomerId::new();
            let cart_id = carts.get_or_create_cart(customer_id).await.unwrap().id;
            Self {
                db,
                carts,
                orders,
                customer_id,
                cart_id,
            }
        }

        async fn product(&self, price: i64, stock: i32, tailor: Option<TailorId>) -> Product {
            let mut product =
                Product::new("Bisht", "menswear", Money::from_major(price), stock).unwrap();
            product.tailor_id = tailor;
            let mut tx = self.db.begin().await.unwrap();
            tx.insert_product(&product).await.unwrap();
            tx.commit().await.unwrap();
            product
        }

        async fn stock(&self, id: ProductId) -> i32 {
            let mut tx = self.db.begin().await.unwrap();
            tx.get_product(id).await.unwrap().unwrap().stock_quantity
        }

        fn shipping(&self) -> ShippingInfo {
            ShippingInfo {
                address: "5 Corniche Rd, Alexandria".to_string(),
                fulfillment: FulfillmentMethod::Delivery,
            }
        }
    }

    #[tokio::test]
    async fn test_place_order_decrements_stock_and_clears_cart() {
        let f = Fixture::new().await;
        let product = f.product(100, 5, None).await;
        f.carts
            .add_item(f.cart_id, product.id, 2, None, None)
            .await
            .unwrap();

        let orders = f
            .orders
            .place_order(f.customer_id, f.cart_id, &f.shipping())
            .await
            .unwrap();

        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price, Money::from_major(200));
        assert_eq!(order.commission_amount, Money::from_major(20));
        assert_eq!(f.stock(product.id).await, 3);
        assert!(f.carts.get_items(f.cart_id).await.unwrap().is_empty());

        let stored = f.orders.get_order(order.id).await.unwrap();
        stored.verify_totals().unwrap();
    }

    #[tokio::test]
    async fn test_empty_cart() {
        let f = Fixture::new().await;
        assert!(matches!(
            f.orders
                .place_order(f.customer_id, f.cart_id, &f.shipping())
                .await,
            Err(CheckoutError::EmptyCart)
        ));
    }

    #[tokio::test]
    async fn test_shortfall_on_any_line_aborts_everything() {
        let f = Fixture::new().await;
        let plenty = f.product(100, 5, None).await;
        let scarce = f.product(50, 2, None).await;
        f.carts
            .add_item(f.cart_id, plenty.id, 2, None, None)
            .await
            .unwrap();
        f.carts
            .add_item(f.cart_id, scarce.id, 2, None, None)
            .await
            .unwrap();

        // Another buyer takes one unit after the cart was filled.
        let mut tx = f.db.begin().await.unwrap();
        tx.adjust_stock(scarce.id, -1).await.unwrap();
        tx.commit().await.unwrap();

        let err = f
            .orders
            .place_order(f.customer_id, f.cart_id, &f.shipping())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock { product_id, .. } if product_id == scarce.id
        ));

        assert_eq!(f.stock(plenty.id).await, 5);
        assert_eq!(f.stock(scarce.id).await, 1);
        assert_eq!(f.db.order_count().await, 0);
        assert_eq!(f.carts.get_items(f.cart_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_prices_are_read_at_assembly_time() {
        let f = Fixture::new().await;
        let product = f.product(100, 5, None).await;
        f.carts
            .add_item(f.cart_id, product.id, 1, None, None)
            .await
            .unwrap();

        let mut repriced = product.clone();
        repriced.price = Money::from_major(130);
        let mut tx = f.db.begin().await.unwrap();
        tx.update_product(&repriced).await.unwrap();
        tx.commit().await.unwrap();

        let orders = f
            .orders
            .place_order(f.customer_id, f.cart_id, &f.shipping())
            .await
            .unwrap();
        assert_eq!(orders[0].total_price, Money::from_major(130));
        assert_eq!(orders[0].items[0].unit_price, Money::from_major(130));
    }

    #[tokio::test]
    async fn test_cart_spanning_tailors_splits_orders() {
        let f = Fixture::new().await;
        let tailor_a = TailorId::new();
        let tailor_b = TailorId::new();
        let a1 = f.product(100, 5, Some(tailor_a)).await;
        let b1 = f.product(40, 5, Some(tailor_b)).await;
        let a2 = f.product(60, 5, Some(tailor_a)).await;
        for id in [a1.id, b1.id, a2.id] {
            f.carts.add_item(f.cart_id, id, 1, None, None).await.unwrap();
        }

        let orders = f
            .orders
            .place_order(f.customer_id, f.cart_id, &f.shipping())
            .await
            .unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].tailor_id, Some(tailor_a));
        assert_eq!(orders[0].items.len(), 2);
        assert_eq!(orders[0].total_price, Money::from_major(160));
        assert_eq!(orders[1].tailor_id, Some(tailor_b));
        assert_eq!(orders[1].total_price, Money::from_major(40));
    }

    #[tokio::test]
    async fn test_failure_before_commit_leaves_cart_and_stock() {
        let f = Fixture::new().await;
        let product = f.product(100, 5, None).await;
        f.carts
            .add_item(f.cart_id, product.id, 1, None, None)
            .await
            .unwrap();

        f.db.set_fail_on(FailPoint::InsertOrder, true);
        let err = f
            .orders
            .place_order(f.customer_id, f.cart_id, &f.shipping())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Unexpected);

        assert_eq!(f.stock(product.id).await, 5);
        assert_eq!(f.carts.get_items(f.cart_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_order_has_no_stock_effect() {
        let f = Fixture::new().await;
        let order = f
            .orders
            .place_custom_order(CustomOrderRequest {
                customer_id: f.customer_id,
                tailor_id: TailorId::new(),
                description: "Wedding suit".to_string(),
                items: vec![
                    CustomItem {
                        description: "Jacket".to_string(),
                        quantity: 1,
                        unit_price: Money::from_major(900),
                    },
                    CustomItem {
                        description: "Trousers".to_string(),
                        quantity: 2,
                        unit_price: Money::from_major(150),
                    },
                ],
                due_date: None,
                fulfillment: FulfillmentMethod::Pickup,
                shipping_address: None,
            })
            .await
            .unwrap();

        assert_eq!(order.total_price, Money::from_major(1200));
        assert_eq!(order.commission_amount, Money::from_major(120));
        assert!(order.items.iter().all(|i| i.product_id.is_none()));

        let listed = f.orders.list_customer_orders(f.customer_id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_custom_order_without_items_is_rejected() {
        let f = Fixture::new().await;
        let err = f
            .orders
            .place_custom_order(CustomOrderRequest {
                customer_id: f.customer_id,
                tailor_id: TailorId::new(),
                description: "Nothing".to_string(),
                items: vec![],
                due_date: None,
                fulfillment: FulfillmentMethod::Pickup,
                shipping_address: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_custom_order_with_unrepresentable_total_is_rejected() {
        let f = Fixture::new().await;
        let err = f
            .orders
            .place_custom_order(CustomOrderRequest {
                customer_id: f.customer_id,
                tailor_id: TailorId::new(),
                description: "Bulk uniforms".to_string(),
                items: vec![CustomItem {
                    description: "Shirt".to_string(),
                    quantity: 4_000_000_000,
                    unit_price: Money::from_cents(10_000_000_000),
                }],
                due_date: None,
                fulfillment: FulfillmentMethod::Pickup,
                shipping_address: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Domain(DomainError::AmountOverflow)));
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert!(f.orders.list_customer_orders(f.customer_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let f = Fixture::new().await;
        let product = f.product(100, 5, None).await;
        f.carts
            .add_item(f.cart_id, product.id, 1, None, None)
            .await
            .unwrap();
        let order = f
            .orders
            .place_order(f.customer_id, f.cart_id, &f.shipping())
            .await
            .unwrap()
            .remove(0);

        f.orders
            .update_status(order.id, OrderStatus::Confirmed)
            .await
            .unwrap();
        let err = f
            .orders
            .update_status(order.id, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidStatusTransition {
                from: OrderStatus::Confirmed,
                to: OrderStatus::Pending,
            }
        ));
        assert!(matches!(
            f.orders.update_status(OrderId::new(), OrderStatus::Cancelled).await,
            Err(CheckoutError::OrderNotFound(_))
        ));
    }
}
