//! Catalog administration and the stock ledger.

use common::{Money, ProductId, TailorId};
use domain::Product;
use serde::{Deserialize, Serialize};
use store::{CatalogStore, Database, StoreError, Transaction};

use crate::error::{CheckoutError, Result};

/// Fields for a new catalog product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub price: Money,
    pub discounted_price: Option<Money>,
    pub stock_quantity: i32,
    pub tailor_id: Option<TailorId>,
}

/// Partial update of admin-editable product fields.
///
/// `discounted_price: Some(None)` removes an existing discount.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<Money>,
    pub discounted_price: Option<Option<Money>>,
}

/// Stock position of a product after a ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock_quantity: i32,
    pub is_available: bool,
}

impl From<&Product> for StockLevel {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id,
            stock_quantity: product.stock_quantity,
            is_available: product.is_available,
        }
    }
}

fn product_error(id: ProductId) -> impl FnOnce(StoreError) -> CheckoutError {
    move |err| match err {
        StoreError::NotFound { .. } => CheckoutError::ProductNotFound(id),
        other => other.into(),
    }
}

/// Applies `delta` to the product's stock inside an open transaction.
///
/// Returns the product as it is after the update.
pub async fn adjust_stock_in<T>(tx: &mut T, id: ProductId, delta: i32) -> Result<Product>
where
    T: CatalogStore + ?Sized,
{
    let product = tx.adjust_stock(id, delta).await.map_err(product_error(id))?;
    metrics::counter!("stock_adjustments_total").increment(1);
    tracing::debug!(
        product_id = %id,
        delta,
        stock = product.stock_quantity,
        "Stock adjusted"
    );
    Ok(product)
}

/// Product catalog backed by a [`Database`].
#[derive(Clone)]
pub struct CatalogService<D: Database> {
    db: D,
}

impl<D: Database> CatalogService<D> {
    pub fn new(db: D) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let mut created = Product::new(
            product.name,
            product.category,
            product.price,
            product.stock_quantity,
        )?;
        if let Some(tailor_id) = product.tailor_id {
            created = created.with_tailor(tailor_id);
        }
        if let Some(discounted) = product.discounted_price {
            created = created.with_discount(discounted)?;
        }

        let mut tx = self.db.begin().await?;
        tx.insert_product(&created).await?;
        tx.commit().await?;

        tracing::info!(product_id = %created.id, "Product created");
        Ok(created)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        let mut tx = self.db.begin().await?;
        tx.get_product(id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(id))
    }

    /// Loads a product for display and counts the view.
    pub async fn view_product(&self, id: ProductId) -> Result<Product> {
        let mut tx = self.db.begin().await?;
        let mut product = tx
            .get_product(id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or(CheckoutError::ProductNotFound(id))?;
        tx.record_view(id).await?;
        tx.commit().await?;
        product.view_count += 1;
        Ok(product)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let mut tx = self.db.begin().await?;
        Ok(tx.list_products().await?)
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        let mut tx = self.db.begin().await?;
        let mut product = tx
            .get_product(id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(id))?;
        if product.is_deleted {
            return Err(CheckoutError::ProductUnavailable(id));
        }

        if let Some(name) = update.name {
            product.name = name;
        }
        if let Some(category) = update.category {
            product.category = category;
        }
        if let Some(price) = update.price {
            if !price.is_positive() {
                return Err(domain::DomainError::InvalidPrice { price }.into());
            }
            product.price = price;
        }
        match update.discounted_price {
            Some(Some(discounted)) => product = product.with_discount(discounted)?,
            Some(None) => product.discounted_price = None,
            None => {}
        }

        tx.update_product(&product).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Restocks (`delta > 0`) or consumes (`delta < 0`) stock.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<StockLevel> {
        let mut tx = self.db.begin().await?;
        let product = adjust_stock_in(&mut tx, id, delta).await?;
        tx.commit().await?;
        Ok(StockLevel::from(&product))
    }

    /// Explicitly enables or disables a product.
    ///
    /// Restocking never re-enables a product on its own; this is the only way
    /// back to available.
    #[tracing::instrument(skip(self))]
    pub async fn set_availability(&self, id: ProductId, available: bool) -> Result<StockLevel> {
        let mut tx = self.db.begin().await?;
        let product = tx
            .set_availability(id, available)
            .await
            .map_err(product_error(id))?;
        tx.commit().await?;
        Ok(StockLevel::from(&product))
    }

    #[tracing::instrument(skip(self))]
    pub async fn soft_delete_product(&self, id: ProductId) -> Result<()> {
        let mut tx = self.db.begin().await?;
        tx.soft_delete_product(id)
            .await
            .map_err(product_error(id))?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use store::InMemoryDatabase;

    use super::*;

    fn new_product(stock: i32) -> NewProduct {
        NewProduct {
            name: "Kaftan".to_string(),
            category: "womenswear".to_string(),
            price: Money::from_major(150),
            discounted_price: None,
            stock_quantity: stock,
            tailor_id: None,
        }
    }

    #[tokio::test]
    async fn test_stock_never_goes_negative() {
        let catalog = CatalogService::new(InMemoryDatabase::new());
        let product = catalog.create_product(new_product(3)).await.unwrap();

        let level = catalog.adjust_stock(product.id, -2).await.unwrap();
        assert_eq!(level.stock_quantity, 1);

        let err = catalog.adjust_stock(product.id, -2).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock {
                requested: 2,
                available: 1,
                ..
            }
        ));
        assert_eq!(catalog.get_product(product.id).await.unwrap().stock_quantity, 1);
    }

    #[tokio::test]
    async fn test_sequence_of_adjustments_stays_non_negative() {
        let catalog = CatalogService::new(InMemoryDatabase::new());
        let product = catalog.create_product(new_product(5)).await.unwrap();

        for delta in [-3, 4, -7, -1, 2, -10, -1] {
            let _ = catalog.adjust_stock(product.id, delta).await;
            let stock = catalog.get_product(product.id).await.unwrap().stock_quantity;
            assert!(stock >= 0, "stock went negative after delta {delta}");
        }
    }

    #[tokio::test]
    async fn test_restock_requires_explicit_enable() {
        let catalog = CatalogService::new(InMemoryDatabase::new());
        let product = catalog.create_product(new_product(1)).await.unwrap();

        let level = catalog.adjust_stock(product.id, -1).await.unwrap();
        assert!(!level.is_available);

        let level = catalog.adjust_stock(product.id, 10).await.unwrap();
        assert_eq!(level.stock_quantity, 10);
        assert!(!level.is_available);

        let level = catalog.set_availability(product.id, true).await.unwrap();
        assert!(level.is_available);
    }

    #[tokio::test]
    async fn test_cannot_enable_without_stock() {
        let catalog = CatalogService::new(InMemoryDatabase::new());
        let product = catalog.create_product(new_product(0)).await.unwrap();

        let err = catalog.set_availability(product.id, true).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let catalog = CatalogService::new(InMemoryDatabase::new());
        let id = ProductId::new();
        assert!(matches!(
            catalog.adjust_stock(id, 1).await,
            Err(CheckoutError::ProductNotFound(found)) if found == id
        ));
        assert!(matches!(
            catalog.soft_delete_product(id).await,
            Err(CheckoutError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_soft_deleted_products_are_hidden() {
        let catalog = CatalogService::new(InMemoryDatabase::new());
        let kept = catalog.create_product(new_product(2)).await.unwrap();
        let deleted = catalog.create_product(new_product(2)).await.unwrap();

        catalog.soft_delete_product(deleted.id).await.unwrap();

        let listed = catalog.list_products().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept.id);
        assert!(matches!(
            catalog.view_product(deleted.id).await,
            Err(CheckoutError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_product_prices() {
        let catalog = CatalogService::new(InMemoryDatabase::new());
        let product = catalog.create_product(new_product(2)).await.unwrap();

        let updated = catalog
            .update_product(
                product.id,
                ProductUpdate {
                    price: Some(Money::from_major(120)),
                    discounted_price: Some(Some(Money::from_major(90))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.effective_price(), Money::from_major(90));

        let cleared = catalog
            .update_product(
                product.id,
                ProductUpdate {
                    discounted_price: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.effective_price(), Money::from_major(120));

        let err = catalog
            .update_product(
                product.id,
                ProductUpdate {
                    price: Some(Money::zero()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_view_counts() {
        let catalog = CatalogService::new(InMemoryDatabase::new());
        let product = catalog.create_product(new_product(2)).await.unwrap();

        catalog.view_product(product.id).await.unwrap();
        let viewed = catalog.view_product(product.id).await.unwrap();
        assert_eq!(viewed.view_count, 2);
    }
}
