use async_trait::async_trait;
use common::{CartId, CartItemId, CustomerId, OrderId, PaymentId, ProductId};
use domain::{CartItem, CartLine, Order, OrderStatus, Payment, PaymentStatus, Product, ShoppingCart};

use crate::Result;

/// Product rows and the stock ledger.
#[async_trait]
pub trait CatalogStore: Send {
    async fn insert_product(&mut self, product: &Product) -> Result<()>;

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Lists products that are not soft-deleted, oldest first.
    async fn list_products(&mut self) -> Result<Vec<Product>>;

    /// Saves admin-editable fields (tailor, name, prices, category).
    async fn update_product(&mut self, product: &Product) -> Result<()>;

    /// Applies `delta` to the stock count as one conditional update.
    ///
    /// Fails with `InsufficientStock` instead of going below zero and marks the
    /// product unavailable when the count reaches exactly zero. Returns the
    /// product as it is after the update.
    async fn adjust_stock(&mut self, id: ProductId, delta: i32) -> Result<Product>;

    /// Sets the availability flag. Enabling a product with no stock fails
    /// with `InsufficientStock`.
    async fn set_availability(&mut self, id: ProductId, available: bool) -> Result<Product>;

    async fn soft_delete_product(&mut self, id: ProductId) -> Result<()>;

    async fn record_sale(&mut self, id: ProductId, quantity: u32) -> Result<()>;

    async fn record_view(&mut self, id: ProductId) -> Result<()>;
}

/// Carts and their items.
#[async_trait]
pub trait CartStore: Send {
    /// Reads lock the cart until the transaction ends, so two checkouts of
    /// the same cart run one after the other.
    async fn find_active_cart(&mut self, customer_id: CustomerId) -> Result<Option<ShoppingCart>>;

    async fn get_cart(&mut self, id: CartId) -> Result<Option<ShoppingCart>>;

    async fn insert_cart(&mut self, cart: &ShoppingCart) -> Result<()>;

    /// Saves timestamps and the active flag.
    async fn save_cart(&mut self, cart: &ShoppingCart) -> Result<()>;

    /// Finds the line with the given merge identity.
    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        size: Option<&str>,
        color: Option<&str>,
    ) -> Result<Option<CartItem>>;

    async fn get_cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>>;

    async fn insert_cart_item(&mut self, item: &CartItem) -> Result<()>;

    async fn set_cart_item_quantity(&mut self, id: CartItemId, quantity: u32) -> Result<()>;

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<()>;

    /// Removes every item of the cart, returning how many were removed.
    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64>;

    /// Items joined with live product data, in insertion order.
    async fn list_cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>>;
}

/// Orders with their items.
#[async_trait]
pub trait OrderStore: Send {
    /// Persists the order header and all of its items.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    async fn list_orders_for_customer(&mut self, customer_id: CustomerId) -> Result<Vec<Order>>;

    /// Moves the order from `expected` to `next`; `StaleState` if it moved meanwhile.
    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()>;
}

/// Payment records.
///
/// Implementations reject a second `Completed` payment for the same order
/// with `Duplicate`.
#[async_trait]
pub trait PaymentStore: Send {
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Locks the payment until the transaction ends.
    async fn get_payment(&mut self, id: PaymentId) -> Result<Option<Payment>>;

    async fn find_payment_by_provider_ref(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<Payment>>;

    async fn list_payments_for_order(&mut self, order_id: OrderId) -> Result<Vec<Payment>>;

    /// Writes `payment` only if the stored status still equals `expected`.
    async fn update_payment(&mut self, payment: &Payment, expected: PaymentStatus) -> Result<()>;
}

/// Stored responses for caller-supplied idempotency keys.
#[async_trait]
pub trait IdempotencyStore: Send {
    async fn get_idempotency_record(&mut self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn save_idempotency_record(&mut self, key: &str, response: &serde_json::Value)
    -> Result<()>;
}

/// A unit of work over every port.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait Transaction:
    CatalogStore + CartStore + OrderStore + PaymentStore + IdempotencyStore + Send
{
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Entry point to a storage backend.
#[async_trait]
pub trait Database: Clone + Send + Sync + 'static {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx>;
}
