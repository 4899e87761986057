//! The per-customer shopping cart.

use chrono::{Duration, Utc};
use common::{CartId, CartItemId, CustomerId, ProductId};
use domain::{CartItem, CartLine, CartSummary, ShoppingCart, normalize_variant};
use store::{CartStore, CatalogStore, Database, Transaction};

use crate::error::{CheckoutError, Result};

/// Refreshes the cart's expiry after a mutation.
async fn touch_cart<T>(tx: &mut T, cart_id: CartId, ttl: Duration) -> Result<()>
where
    T: CartStore + ?Sized,
{
    let mut cart = tx
        .get_cart(cart_id)
        .await?
        .ok_or(CheckoutError::CartNotFound(cart_id))?;
    cart.touch(ttl, Utc::now());
    tx.save_cart(&cart).await?;
    Ok(())
}

fn to_quantity(quantity: i64) -> Result<u32> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or(CheckoutError::InvalidQuantity(quantity))
}

/// Cart operations. Prices and availability are always read live from the
/// catalog; the cart stores no price.
#[derive(Clone)]
pub struct CartService<D: Database> {
    db: D,
    ttl: Duration,
}

impl<D: Database> CartService<D> {
    pub fn new(db: D, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Returns the customer's active cart, creating one if needed.
    ///
    /// An expired cart is deactivated and replaced by an empty one.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create_cart(&self, customer_id: CustomerId) -> Result<ShoppingCart> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        if let Some(mut cart) = tx.find_active_cart(customer_id).await? {
            if !cart.is_expired(now) {
                return Ok(cart);
            }
            tracing::info!(cart_id = %cart.id, "Replacing expired cart");
            cart.is_active = false;
            cart.updated_at = now;
            tx.save_cart(&cart).await?;
        }

        let cart = ShoppingCart::new(customer_id, self.ttl, now);
        tx.insert_cart(&cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Adds `quantity` units of a product variant.
    ///
    /// An existing line with the same product, size and color is incremented
    /// instead of duplicated. The merged quantity may not exceed current stock.
    #[tracing::instrument(skip(self, size, color))]
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i64,
        size: Option<String>,
        color: Option<String>,
    ) -> Result<CartItem> {
        let quantity = to_quantity(quantity)?;
        let size = normalize_variant(size);
        let color = normalize_variant(color);

        let mut tx = self.db.begin().await?;
        let cart = tx
            .get_cart(cart_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(CheckoutError::CartNotFound(cart_id))?;
        let product = tx
            .get_product(product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(product_id))?;
        if !product.is_purchasable() {
            return Err(CheckoutError::ProductUnavailable(product_id));
        }

        let existing = tx
            .find_cart_item(cart.id, product_id, size.as_deref(), color.as_deref())
            .await?;
        let merged = existing.as_ref().map_or(0, |i| i.quantity) + quantity;
        if i64::from(merged) > i64::from(product.stock_quantity) {
            return Err(CheckoutError::InsufficientStock {
                product_id,
                requested: i64::from(merged),
                available: product.stock_quantity,
            });
        }

        let item = match existing {
            Some(mut item) => {
                tx.set_cart_item_quantity(item.id, merged).await?;
                item.quantity = merged;
                item
            }
            None => {
                let item = CartItem::new(cart.id, product_id, quantity, size, color)?;
                tx.insert_cart_item(&item).await?;
                item
            }
        };

        touch_cart(&mut tx, cart.id, self.ttl).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Sets a line's quantity; zero or less removes the line.
    ///
    /// Returns the updated item, or `None` when it was removed.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<Option<CartItem>> {
        let mut tx = self.db.begin().await?;
        let mut item = tx
            .get_cart_item(item_id)
            .await?
            .ok_or(CheckoutError::CartItemNotFound(item_id))?;

        let updated = if quantity <= 0 {
            tx.delete_cart_item(item_id).await?;
            None
        } else {
            let quantity = to_quantity(quantity)?;
            tx.set_cart_item_quantity(item_id, quantity).await?;
            item.quantity = quantity;
            Some(item.clone())
        };

        touch_cart(&mut tx, item.cart_id, self.ttl).await?;
        tx.commit().await?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, item_id: CartItemId) -> Result<()> {
        let mut tx = self.db.begin().await?;
        let item = tx
            .get_cart_item(item_id)
            .await?
            .ok_or(CheckoutError::CartItemNotFound(item_id))?;
        tx.delete_cart_item(item_id).await?;
        touch_cart(&mut tx, item.cart_id, self.ttl).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Removes every item, returning how many lines were removed.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, cart_id: CartId) -> Result<u64> {
        let mut tx = self.db.begin().await?;
        if tx.get_cart(cart_id).await?.is_none() {
            return Err(CheckoutError::CartNotFound(cart_id));
        }
        let removed = tx.clear_cart(cart_id).await?;
        touch_cart(&mut tx, cart_id, self.ttl).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Lines in insertion order with live product data.
    pub async fn get_items(&self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let mut tx = self.db.begin().await?;
        if tx.get_cart(cart_id).await?.is_none() {
            return Err(CheckoutError::CartNotFound(cart_id));
        }
        Ok(tx.list_cart_lines(cart_id).await?)
    }

    pub async fn summary(&self, cart_id: CartId) -> Result<CartSummary> {
        let lines = self.get_items(cart_id).await?;
        Ok(CartSummary::from_lines(cart_id, lines)?)
    }
}

#[cfg(test)]
mod tests {
    use common::Money;
    use domain::Product;
    use store::InMemoryDatabase;

    use super::*;

    struct Fixture {
        db: InMemoryDatabase,
        carts: CartService<InMemoryDatabase>,
    }

    impl Fixture {
        fn new() -> Self {
            let db = InMemoryDatabase::new();
            Self {
                carts: CartService::new(db.clone(), Duration::hours(1)),
                db,
            }
        }

        async fn product(&self, price: i64, stock: i32) -> Product {
            let product = Product::new("Thobe", "menswear", Money::from_major(price), stock).unwrap();
            let mut tx = self.db.begin().await.unwrap();
            tx.insert_product(&product).await.unwrap();
            tx.commit().await.unwrap();
            product
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let f = Fixture::new();
        let customer = CustomerId::new();
        let first = f.carts.get_or_create_cart(customer).await.unwrap();
        let second = f.carts.get_or_create_cart(customer).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_expired_cart_is_replaced() {
        let db = InMemoryDatabase::new();
        let carts = CartService::new(db.clone(), Duration::seconds(-1));
        let customer = CustomerId::new();

        let first = carts.get_or_create_cart(customer).await.unwrap();
        let second = carts.get_or_create_cart(customer).await.unwrap();
        assert_ne!(first.id, second.id);

        let mut tx = db.begin().await.unwrap();
        let old = tx.get_cart(first.id).await.unwrap().unwrap();
        assert!(!old.is_active);
    }

    #[tokio::test]
    async fn test_add_same_variant_merges() {
        let f = Fixture::new();
        let product = f.product(100, 10).await;
        let cart = f.carts.get_or_create_cart(CustomerId::new()).await.unwrap();

        let first = f
            .carts
            .add_item(cart.id, product.id, 2, Some("M".into()), None)
            .await
            .unwrap();
        let second = f
            .carts
            .add_item(cart.id, product.id, 3, Some(" M ".into()), Some("".into()))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 5);

        f.carts
            .add_item(cart.id, product.id, 1, Some("L".into()), None)
            .await
            .unwrap();

        let lines = f.carts.get_items(cart.id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].item.quantity, 5);
        assert_eq!(lines[1].item.size.as_deref(), Some("L"));
    }

    #[tokio::test]
    async fn test_add_rejects_bad_quantity_and_unavailable_products() {
        let f = Fixture::new();
        let product = f.product(100, 0).await;
        let cart = f.carts.get_or_create_cart(CustomerId::new()).await.unwrap();

        assert!(matches!(
            f.carts.add_item(cart.id, product.id, 0, None, None).await,
            Err(CheckoutError::InvalidQuantity(0))
        ));
        assert!(matches!(
            f.carts.add_item(cart.id, product.id, 1, None, None).await,
            Err(CheckoutError::ProductUnavailable(_))
        ));
        assert!(matches!(
            f.carts.add_item(cart.id, ProductId::new(), 1, None, None).await,
            Err(CheckoutError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_merged_quantity_limited_by_stock() {
        let f = Fixture::new();
        let product = f.product(100, 3).await;
        let cart = f.carts.get_or_create_cart(CustomerId::new()).await.unwrap();

        f.carts.add_item(cart.id, product.id, 2, None, None).await.unwrap();
        let err = f
            .carts
            .add_item(cart.id, product.id, 2, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_quantity_zero_removes() {
        let f = Fixture::new();
        let product = f.product(100, 10).await;
        let cart = f.carts.get_or_create_cart(CustomerId::new()).await.unwrap();
        let item = f
            .carts
            .add_item(cart.id, product.id, 2, None, None)
            .await
            .unwrap();

        let updated = f.carts.update_quantity(item.id, 4).await.unwrap().unwrap();
        assert_eq!(updated.quantity, 4);

        assert!(f.carts.update_quantity(item.id, -1).await.unwrap().is_none());
        assert!(f.carts.get_items(cart.id).await.unwrap().is_empty());
        assert!(matches!(
            f.carts.update_quantity(item.id, 1).await,
            Err(CheckoutError::CartItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_summary_uses_live_prices() {
        let f = Fixture::new();
        let product = f.product(100, 10).await;
        let cart = f.carts.get_or_create_cart(CustomerId::new()).await.unwrap();
        f.carts.add_item(cart.id, product.id, 2, None, None).await.unwrap();

        let summary = f.carts.summary(cart.id).await.unwrap();
        assert_eq!(summary.subtotal, Money::from_major(200));
        assert_eq!(summary.item_count, 2);

        let mut repriced = product.clone();
        repriced.discounted_price = Some(Money::from_major(80));
        let mut tx = f.db.begin().await.unwrap();
        tx.update_product(&repriced).await.unwrap();
        tx.commit().await.unwrap();

        let summary = f.carts.summary(cart.id).await.unwrap();
        assert_eq!(summary.subtotal, Money::from_major(160));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let f = Fixture::new();
        let a = f.product(100, 10).await;
        let b = f.product(50, 10).await;
        let cart = f.carts.get_or_create_cart(CustomerId::new()).await.unwrap();

        let item = f.carts.add_item(cart.id, a.id, 1, None, None).await.unwrap();
        f.carts.add_item(cart.id, b.id, 1, None, None).await.unwrap();

        f.carts.remove_item(item.id).await.unwrap();
        assert_eq!(f.carts.get_items(cart.id).await.unwrap().len(), 1);

        assert_eq!(f.carts.clear(cart.id).await.unwrap(), 1);
        assert!(f.carts.summary(cart.id).await.unwrap().is_empty());
    }
}
