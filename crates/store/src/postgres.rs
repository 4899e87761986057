use async_trait::async_trait;
use chrono::Utc;
use common::{
    CartId, CartItemId, CommissionRate, CustomerId, Money, OrderId, OrderItemId, PaymentId,
    ProductId, TailorId,
};
use domain::{
    CartItem, CartLine, DomainError, Order, OrderItem, OrderStatus, Payment, PaymentStatus,
    Product, ProviderMetadata, ShoppingCart, effective_price,
};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    ports::{
        CartStore, CatalogStore, Database, IdempotencyStore, OrderStore, PaymentStore, Transaction,
    },
};

macro_rules! product_columns {
    () => {
        "id, tailor_id, name, price_cents, discounted_price_cents, category, stock_quantity, \
         is_available, sales_count, view_count, is_deleted, created_at, updated_at"
    };
}

macro_rules! order_columns {
    () => {
        "id, customer_id, tailor_id, description, total_price_cents, commission_rate_bps, \
         commission_amount_cents, status, fulfillment, shipping_address, created_at, due_date"
    };
}

macro_rules! payment_columns {
    () => {
        "id, order_id, customer_id, tailor_id, amount_cents, payment_type, status, \
         transaction_type, requires_action, provider, provider_transaction_id, \
         refunded_amount_cents, refunded_at, refund_reason, paid_at, created_at, updated_at"
    };
}

macro_rules! cart_columns {
    () => {
        "id, customer_id, created_at, updated_at, expires_at, is_active"
    };
}

macro_rules! cart_item_columns {
    () => {
        "id, cart_id, product_id, quantity, size, color, added_at"
    };
}

/// PostgreSQL-backed database.
#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Creates a new PostgreSQL database handle.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction { tx })
    }
}

/// A transaction on [`PostgresDatabase`]. Rolled back by sqlx when dropped.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn to_db_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| {
        StoreError::Decode(DomainError::InvalidQuantity {
            quantity: i64::from(quantity),
        })
    })
}

fn from_db_quantity(quantity: i32) -> Result<u32> {
    u32::try_from(quantity).map_err(|_| {
        StoreError::Decode(DomainError::InvalidQuantity {
            quantity: i64::from(quantity),
        })
    })
}

fn map_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return StoreError::Duplicate(what());
    }
    StoreError::Database(err)
}

fn expect_product_row(id: ProductId, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        return Err(StoreError::not_found("Product", id));
    }
    Ok(())
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        tailor_id: row
            .try_get::<Option<Uuid>, _>("tailor_id")?
            .map(TailorId::from_uuid),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        discounted_price: row
            .try_get::<Option<i64>, _>("discounted_price_cents")?
            .map(Money::from_cents),
        category: row.try_get("category")?,
        stock_quantity: row.try_get("stock_quantity")?,
        is_available: row.try_get("is_available")?,
        sales_count: row.try_get("sales_count")?,
        view_count: row.try_get("view_count")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart(row: &PgRow) -> Result<ShoppingCart> {
    Ok(ShoppingCart {
        id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: from_db_quantity(row.try_get("quantity")?)?,
        size: row.try_get("size")?,
        color: row.try_get("color")?,
        added_at: row.try_get("added_at")?,
    })
}

fn row_to_order_header(row: &PgRow) -> Result<Order> {
    let bps: i32 = row.try_get("commission_rate_bps")?;
    let status: String = row.try_get("status")?;
    let fulfillment: String = row.try_get("fulfillment")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        tailor_id: row
            .try_get::<Option<Uuid>, _>("tailor_id")?
            .map(TailorId::from_uuid),
        description: row.try_get("description")?,
        total_price: Money::from_cents(row.try_get("total_price_cents")?),
        commission_rate: CommissionRate::from_basis_points(bps.max(0) as u32),
        commission_amount: Money::from_cents(row.try_get("commission_amount_cents")?),
        status: status.parse()?,
        fulfillment: fulfillment.parse()?,
        shipping_address: row.try_get("shipping_address")?,
        created_at: row.try_get("created_at")?,
        due_date: row.try_get("due_date")?,
        items: Vec::new(),
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: row
            .try_get::<Option<Uuid>, _>("product_id")?
            .map(ProductId::from_uuid),
        description: row.try_get("description")?,
        quantity: from_db_quantity(row.try_get("quantity")?)?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        total: Money::from_cents(row.try_get("total_cents")?),
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let payment_type: String = row.try_get("payment_type")?;
    let status: String = row.try_get("status")?;
    let transaction_type: String = row.try_get("transaction_type")?;
    let provider: Option<String> = row.try_get("provider")?;
    let provider_transaction_id: Option<String> = row.try_get("provider_transaction_id")?;

    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        tailor_id: row
            .try_get::<Option<Uuid>, _>("tailor_id")?
            .map(TailorId::from_uuid),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        payment_type: payment_type.parse()?,
        status: status.parse()?,
        transaction_type: transaction_type.parse()?,
        requires_action: row.try_get("requires_action")?,
        provider: match (provider, provider_transaction_id) {
            (Some(provider), Some(transaction_id)) => Some(ProviderMetadata {
                provider,
                transaction_id,
            }),
            _ => None,
        },
        refunded_amount: Money::from_cents(row.try_get("refunded_amount_cents")?),
        refunded_at: row.try_get("refunded_at")?,
        refund_reason: row.try_get("refund_reason")?,
        paid_at: row.try_get("paid_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PgTransaction {
    async fn load_items(&mut self, order: &mut Order) -> Result<()> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, description, quantity, unit_price_cents, total_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order.id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        order.items = rows
            .iter()
            .map(row_to_order_item)
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    async fn product_exists(&mut self, id: ProductId) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgTransaction {
    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, tailor_id, name, price_cents, discounted_price_cents, category,
                                  stock_quantity, is_available, sales_count, view_count, is_deleted,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.tailor_id.map(|t| t.as_uuid()))
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.discounted_price.map(|m| m.cents()))
        .bind(&product.category)
        .bind(product.stock_quantity)
        .bind(product.is_available)
        .bind(product.sales_count)
        .bind(product.view_count)
        .bind(product.is_deleted)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique(e, || format!("product {}", product.id)))?;
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn list_products(&mut self) -> Result<Vec<Product>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE NOT is_deleted ORDER BY seq ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET tailor_id = $2, name = $3, price_cents = $4, discounted_price_cents = $5,
                category = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.tailor_id.map(|t| t.as_uuid()))
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.discounted_price.map(|m| m.cents()))
        .bind(&product.category)
        .execute(&mut *self.tx)
        .await?;

        expect_product_row(product.id, result.rows_affected())
    }

    async fn adjust_stock(&mut self, id: ProductId, delta: i32) -> Result<Product> {
        let row = sqlx::query(concat!(
            "UPDATE products ",
            "SET stock_quantity = stock_quantity + $2, ",
            "is_available = CASE WHEN stock_quantity + $2 = 0 THEN FALSE ELSE is_available END, ",
            "updated_at = NOW() ",
            "WHERE id = $1 AND stock_quantity + $2 >= 0 ",
            "RETURNING ",
            product_columns!()
        ))
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = row {
            return row_to_product(&row);
        }

        let available: Option<i32> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        match available {
            Some(available) => Err(StoreError::InsufficientStock {
                product_id: id,
                requested: -i64::from(delta),
                available,
            }),
            None => Err(StoreError::not_found("Product", id)),
        }
    }

    async fn set_availability(&mut self, id: ProductId, available: bool) -> Result<Product> {
        let row = sqlx::query(concat!(
            "UPDATE products SET is_available = $2, updated_at = NOW() ",
            "WHERE id = $1 AND (NOT $2 OR stock_quantity > 0) ",
            "RETURNING ",
            product_columns!()
        ))
        .bind(id.as_uuid())
        .bind(available)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => row_to_product(&row),
            None if self.product_exists(id).await? => Err(StoreError::InsufficientStock {
                product_id: id,
                requested: 1,
                available: 0,
            }),
            None => Err(StoreError::not_found("Product", id)),
        }
    }

    async fn soft_delete_product(&mut self, id: ProductId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET is_deleted = TRUE, is_available = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&mut *self.tx)
        .await?;

        expect_product_row(id, result.rows_affected())
    }

    async fn record_sale(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET sales_count = sales_count + $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut *self.tx)
            .await?;

        expect_product_row(id, result.rows_affected())
    }

    async fn record_view(&mut self, id: ProductId) -> Result<()> {
        let result = sqlx::query("UPDATE products SET view_count = view_count + 1 WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        expect_product_row(id, result.rows_affected())
    }
}

#[async_trait]
impl CartStore for PgTransaction {
    async fn find_active_cart(&mut self, customer_id: CustomerId) -> Result<Option<ShoppingCart>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            cart_columns!(),
            " FROM shopping_carts WHERE customer_id = $1 AND is_active FOR UPDATE"
        ))
        .bind(customer_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_cart).transpose()
    }

    async fn get_cart(&mut self, id: CartId) -> Result<Option<ShoppingCart>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            cart_columns!(),
            " FROM shopping_carts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_cart).transpose()
    }

    async fn insert_cart(&mut self, cart: &ShoppingCart) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shopping_carts (id, customer_id, created_at, updated_at, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.customer_id.as_uuid())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .bind(cart.expires_at)
        .bind(cart.is_active)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique(e, || format!("active cart for customer {}", cart.customer_id)))?;
        Ok(())
    }

    async fn save_cart(&mut self, cart: &ShoppingCart) -> Result<()> {
        let result = sqlx::query(
            "UPDATE shopping_carts SET updated_at = $2, expires_at = $3, is_active = $4 WHERE id = $1",
        )
        .bind(cart.id.as_uuid())
        .bind(cart.updated_at)
        .bind(cart.expires_at)
        .bind(cart.is_active)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("ShoppingCart", cart.id));
        }
        Ok(())
    }

    async fn find_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        size: Option<&str>,
        color: Option<&str>,
    ) -> Result<Option<CartItem>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            cart_item_columns!(),
            " FROM cart_items WHERE cart_id = $1 AND product_id = $2 ",
            "AND size IS NOT DISTINCT FROM $3 AND color IS NOT DISTINCT FROM $4"
        ))
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(size)
        .bind(color)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn get_cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            cart_item_columns!(),
            " FROM cart_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity, size, color, added_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(to_db_quantity(item.quantity)?)
        .bind(item.size.as_deref())
        .bind(item.color.as_deref())
        .bind(item.added_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            map_unique(e, || {
                format!(
                    "cart item for product {} in cart {}",
                    item.product_id, item.cart_id
                )
            })
        })?;
        Ok(())
    }

    async fn set_cart_item_quantity(&mut self, id: CartItemId, quantity: u32) -> Result<()> {
        let result = sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(to_db_quantity(quantity)?)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("CartItem", id));
        }
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("CartItem", id));
        }
        Ok(())
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.size, ci.color, ci.added_at,
                   p.name AS product_name, p.tailor_id, p.price_cents, p.discounted_price_cents,
                   p.is_available, p.is_deleted, p.stock_quantity
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.seq ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| -> Result<CartLine> {
                let price = Money::from_cents(row.try_get("price_cents")?);
                let discounted = row
                    .try_get::<Option<i64>, _>("discounted_price_cents")?
                    .map(Money::from_cents);
                Ok(CartLine {
                    item: row_to_cart_item(row)?,
                    product_name: row.try_get("product_name")?,
                    tailor_id: row
                        .try_get::<Option<Uuid>, _>("tailor_id")?
                        .map(TailorId::from_uuid),
                    unit_price: effective_price(price, discounted),
                    is_available: row.try_get("is_available")?,
                    is_deleted: row.try_get("is_deleted")?,
                    stock_quantity: row.try_get("stock_quantity")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OrderStore for PgTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, tailor_id, description, total_price_cents,
                                commission_rate_bps, commission_amount_cents, status, fulfillment,
                                shipping_address, created_at, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.tailor_id.map(|t| t.as_uuid()))
        .bind(&order.description)
        .bind(order.total_price.cents())
        .bind(order.commission_rate.basis_points() as i32)
        .bind(order.commission_amount.cents())
        .bind(order.status.as_str())
        .bind(order.fulfillment.as_str())
        .bind(order.shipping_address.as_deref())
        .bind(order.created_at)
        .bind(order.due_date)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique(e, || format!("order {}", order.id)))?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, description, quantity,
                                         unit_price_cents, total_cents, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(item.product_id.map(|p| p.as_uuid()))
            .bind(&item.description)
            .bind(to_db_quantity(item.quantity)?)
            .bind(item.unit_price.cents())
            .bind(item.total.cents())
            .bind(position as i32)
            .execute(&mut *self.tx)
            .await?;
        }

        tracing::debug!(order_id = %order.id, items = order.items.len(), "Inserted order");
        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = row_to_order_header(&row)?;
        self.load_items(&mut order).await?;
        Ok(Some(order))
    }

    async fn list_orders_for_customer(&mut self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE customer_id = $1 ORDER BY created_at ASC"
        ))
        .bind(customer_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        let mut orders = rows
            .iter()
            .map(row_to_order_header)
            .collect::<Result<Vec<_>>>()?;
        for order in &mut orders {
            self.load_items(order).await?;
        }
        Ok(orders)
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id.as_uuid())
            .bind(expected.as_str())
            .bind(next.as_str())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        match exists {
            Some(_) => Err(StoreError::stale("Order", id, expected)),
            None => Err(StoreError::not_found("Order", id)),
        }
    }
}

#[async_trait]
impl PaymentStore for PgTransaction {
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        let (provider, provider_txn) = match &payment.provider {
            Some(meta) => (Some(meta.provider.as_str()), Some(meta.transaction_id.as_str())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, customer_id, tailor_id, amount_cents, payment_type,
                                  status, transaction_type, requires_action, provider,
                                  provider_transaction_id, refunded_amount_cents, refunded_at,
                                  refund_reason, paid_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.customer_id.as_uuid())
        .bind(payment.tailor_id.map(|t| t.as_uuid()))
        .bind(payment.amount.cents())
        .bind(payment.payment_type.as_str())
        .bind(payment.status.as_str())
        .bind(payment.transaction_type.as_str())
        .bind(payment.requires_action)
        .bind(provider)
        .bind(provider_txn)
        .bind(payment.refunded_amount.cents())
        .bind(payment.refunded_at)
        .bind(payment.refund_reason.as_deref())
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            map_unique(e, || {
                format!("order {} already has a completed payment", payment.order_id)
            })
        })?;
        Ok(())
    }

    async fn get_payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn find_payment_by_provider_ref(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE provider_transaction_id = $1 FOR UPDATE"
        ))
        .bind(transaction_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn list_payments_for_order(&mut self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(row_to_payment).collect()
    }

    async fn update_payment(&mut self, payment: &Payment, expected: PaymentStatus) -> Result<()> {
        let (provider, provider_txn) = match &payment.provider {
            Some(meta) => (Some(meta.provider.as_str()), Some(meta.transaction_id.as_str())),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3, requires_action = $4, provider = $5, provider_transaction_id = $6,
                refunded_amount_cents = $7, refunded_at = $8, refund_reason = $9, paid_at = $10,
                updated_at = $11
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(expected.as_str())
        .bind(payment.status.as_str())
        .bind(payment.requires_action)
        .bind(provider)
        .bind(provider_txn)
        .bind(payment.refunded_amount.cents())
        .bind(payment.refunded_at)
        .bind(payment.refund_reason.as_deref())
        .bind(payment.paid_at)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            map_unique(e, || {
                format!("order {} already has a completed payment", payment.order_id)
            })
        })?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM payments WHERE id = $1")
            .bind(payment.id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        match exists {
            Some(_) => Err(StoreError::stale("Payment", payment.id, expected)),
            None => Err(StoreError::not_found("Payment", payment.id)),
        }
    }
}

#[async_trait]
impl IdempotencyStore for PgTransaction {
    async fn get_idempotency_record(&mut self, key: &str) -> Result<Option<serde_json::Value>> {
        let response: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT response FROM idempotency_keys WHERE key = $1")
                .bind(key)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(response)
    }

    async fn save_idempotency_record(
        &mut self,
        key: &str,
        response: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query("INSERT INTO idempotency_keys (key, response) VALUES ($1, $2)")
            .bind(key)
            .bind(response)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_unique(e, || format!("idempotency key {key}")))?;
        Ok(())
    }
}
