use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, CartItemId, CustomerId, OrderId, PaymentId, ProductId};
use domain::{
    CartItem, CartLine, DomainError, Order, OrderStatus, Payment, PaymentStatus, Product,
    ShoppingCart,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    ports::{
        CartStore, CatalogStore, Database, IdempotencyStore, OrderStore, PaymentStore, Transaction,
    },
};

/// Points at which the in-memory adapter can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertOrder,
    InsertPayment,
    Commit,
}

#[derive(Debug, Default)]
struct FaultFlags {
    insert_order: AtomicBool,
    insert_payment: AtomicBool,
    commit: AtomicBool,
}

impl FaultFlags {
    fn flag(&self, point: FailPoint) -> &AtomicBool {
        match point {
            FailPoint::InsertOrder => &self.insert_order,
            FailPoint::InsertPayment => &self.insert_payment,
            FailPoint::Commit => &self.commit,
        }
    }

    fn check(&self, point: FailPoint, label: &'static str) -> Result<()> {
        if self.flag(point).load(Ordering::SeqCst) {
            return Err(StoreError::Injected(label));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    products: Vec<Product>,
    carts: Vec<ShoppingCart>,
    cart_items: Vec<CartItem>,
    orders: Vec<Order>,
    payments: Vec<Payment>,
    idempotency: HashMap<String, serde_json::Value>,
}

/// In-memory database for tests and local runs.
///
/// A transaction holds an exclusive lock on the tables for its whole lifetime
/// and works on a private copy that replaces the tables on commit, so
/// transactions are fully serialized.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<FaultFlags>,
}

impl InMemoryDatabase {
    /// Creates a new empty in-memory database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the database to fail whenever `point` is reached.
    pub fn set_fail_on(&self, point: FailPoint, fail: bool) {
        self.faults.flag(point).store(fail, Ordering::SeqCst);
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the number of committed payments.
    pub async fn payment_count(&self) -> usize {
        self.tables.lock().await.payments.len()
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        })
    }
}

/// A serialized transaction over [`InMemoryDatabase`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<FaultFlags>,
}

impl InMemoryTransaction {
    fn product_mut(&mut self, id: ProductId) -> Result<&mut Product> {
        self.working
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("Product", id))
    }

    fn load_order(&self, id: OrderId) -> Option<Order> {
        self.working.orders.iter().find(|o| o.id == id).cloned()
    }

    fn ensure_single_completed(&self, payment: &Payment) -> Result<()> {
        if payment.status != PaymentStatus::Completed {
            return Ok(());
        }
        let conflict = self.working.payments.iter().any(|p| {
            p.order_id == payment.order_id && p.id != payment.id && p.status == PaymentStatus::Completed
        });
        if conflict {
            return Err(StoreError::Duplicate(format!(
                "order {} already has a completed payment",
                payment.order_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(self) -> Result<()> {
        self.faults.check(FailPoint::Commit, "commit")?;
        let Self {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryTransaction {
    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        if self.working.products.iter().any(|p| p.id == product.id) {
            return Err(StoreError::Duplicate(format!("product {}", product.id)));
        }
        self.working.products.push(product.clone());
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.iter().find(|p| p.id == id).cloned())
    }

    async fn list_products(&mut self) -> Result<Vec<Product>> {
        Ok(self
            .working
            .products
            .iter()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect())
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let stored = self.product_mut(product.id)?;
        stored.tailor_id = product.tailor_id;
        stored.name = product.name.clone();
        stored.price = product.price;
        stored.discounted_price = product.discounted_price;
        stored.category = product.category.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn adjust_stock(&mut self, id: ProductId, delta: i32) -> Result<Product> {
        let product = self.product_mut(id)?;
        product.apply_stock_delta(delta).map_err(|e| match e {
            DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            } => StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            other => StoreError::Decode(other),
        })?;
        Ok(product.clone())
    }

    async fn set_availability(&mut self, id: ProductId, available: bool) -> Result<Product> {
        let product = self.product_mut(id)?;
        if available && product.stock_quantity == 0 {
            return Err(StoreError::InsufficientStock {
                product_id: id,
                requested: 1,
                available: 0,
            });
        }
        product.is_available = available;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn soft_delete_product(&mut self, id: ProductId) -> Result<()> {
        let product = self.product_mut(id)?;
        product.is_deleted = true;
        product.is_available = false;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn record_sale(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        self.product_mut(id)?.sales_count += i64::from(quantity);
        Ok(())
    }

    async fn record_view(&mut self, id: ProductId) -> Result<()> {
        self.product_mut(id)?.view_count += 1;
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryTransaction {
    async fn find_active_cart(&mut self, customer_id: CustomerId) -> Result<Option<ShoppingCart>> {
        Ok(self
            .working
            .carts
            .iter()
            .find(|c| c.customer_id == customer_id && c.is_active)
            .cloned())
    }

    async fn get_cart(&mut self, id: CartId) -> Result<Option<ShoppingCart>> {
        Ok(self.working.carts.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_cart(&mut self, cart: &ShoppingCart) -> Result<()> {
        if cart.is_active
            && self
                .working
                .carts
                .iter()
                .any(|c| c.customer_id == cart.customer_id && c.is_active)
        {
            return Err(StoreError::Duplicate(format!(
                "active cart for customer {}",
                cart.customer_id
            )));
        }
        self.working.carts.push(cart.clone());
        Ok(())
    }

    async fn save_cart(&mut self, cart: &ShoppingCart) -> Result<()> {
        let stored = self
            .working
            .carts
            .iter_mut()
            .find(|c| c.id == cart.id)
            .ok_or_else(|| StoreError::not_found("ShoppingCart", cart.id))?;
        stored.updated_at = cart.updated_at;
        stored.expires_at = cart.expires_at;
        stored.is_active = cart.is_active;
        Ok(())
    }

    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        size: Option<&str>,
        color: Option<&str>,
    ) -> Result<Option<CartItem>> {
        Ok(self
            .working
            .cart_items
            .iter()
            .find(|i| {
                i.cart_id == cart_id
                    && i.product_id == product_id
                    && i.size.as_deref() == size
                    && i.color.as_deref() == color
            })
            .cloned())
    }

    async fn get_cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>> {
        Ok(self.working.cart_items.iter().find(|i| i.id == id).cloned())
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> Result<()> {
        if self
            .working
            .cart_items
            .iter()
            .any(|i| i.cart_id == item.cart_id && i.matches(item.product_id, &item.size, &item.color))
        {
            return Err(StoreError::Duplicate(format!(
                "cart item for product {} in cart {}",
                item.product_id, item.cart_id
            )));
        }
        self.working.cart_items.push(item.clone());
        Ok(())
    }

    async fn set_cart_item_quantity(&mut self, id: CartItemId, quantity: u32) -> Result<()> {
        let item = self
            .working
            .cart_items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| StoreError::not_found("CartItem", id))?;
        item.quantity = quantity;
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<()> {
        let before = self.working.cart_items.len();
        self.working.cart_items.retain(|i| i.id != id);
        if self.working.cart_items.len() == before {
            return Err(StoreError::not_found("CartItem", id));
        }
        Ok(())
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64> {
        let before = self.working.cart_items.len();
        self.working.cart_items.retain(|i| i.cart_id != cart_id);
        Ok((before - self.working.cart_items.len()) as u64)
    }

    async fn list_cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let products = &self.working.products;
        Ok(self
            .working
            .cart_items
            .iter()
            .filter(|i| i.cart_id == cart_id)
            .filter_map(|item| {
                let product = products.iter().find(|p| p.id == item.product_id)?;
                Some(CartLine {
                    item: item.clone(),
                    product_name: product.name.clone(),
                    tailor_id: product.tailor_id,
                    unit_price: product.effective_price(),
                    is_available: product.is_available,
                    is_deleted: product.is_deleted,
                    stock_quantity: product.stock_quantity,
                })
            })
            .collect())
    }
}

#[async_trait]
impl OrderStore for InMemoryTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.faults.check(FailPoint::InsertOrder, "insert_order")?;
        if self.working.orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::Duplicate(format!("order {}", order.id)));
        }
        self.working.orders.push(order.clone());
        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.load_order(id))
    }

    async fn list_orders_for_customer(&mut self, customer_id: CustomerId) -> Result<Vec<Order>> {
        Ok(self
            .working
            .orders
            .iter()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        let order = self
            .working
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::not_found("Order", id))?;
        if order.status != expected {
            return Err(StoreError::stale("Order", id, expected));
        }
        order.status = next;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryTransaction {
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        self.faults.check(FailPoint::InsertPayment, "insert_payment")?;
        if self.load_order(payment.order_id).is_none() {
            return Err(StoreError::not_found("Order", payment.order_id));
        }
        self.ensure_single_completed(payment)?;
        self.working.payments.push(payment.clone());
        Ok(())
    }

    async fn get_payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.working.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn find_payment_by_provider_ref(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .find(|p| {
                p.provider
                    .as_ref()
                    .is_some_and(|m| m.transaction_id == transaction_id)
            })
            .cloned())
    }

    async fn list_payments_for_order(&mut self, order_id: OrderId) -> Result<Vec<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_payment(&mut self, payment: &Payment, expected: PaymentStatus) -> Result<()> {
        self.ensure_single_completed(payment)?;
        let stored = self
            .working
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or_else(|| StoreError::not_found("Payment", payment.id))?;
        if stored.status != expected {
            return Err(StoreError::stale("Payment", payment.id, expected));
        }
        *stored = payment.clone();
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryTransaction {
    async fn get_idempotency_record(&mut self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.working.idempotency.get(key).cloned())
    }

    async fn save_idempotency_record(
        &mut self,
        key: &str,
        response: &serde_json::Value,
    ) -> Result<()> {
        if self.working.idempotency.contains_key(key) {
            return Err(StoreError::Duplicate(format!("idempotency key {key}")));
        }
        self.working
            .idempotency
            .insert(key.to_string(), response.clone());
        Ok(())
    }
}
