//! Catalog product and stock ledger rules.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, TailorId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A sellable product in the store catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Owning tailor; `None` for platform-owned stock.
    pub tailor_id: Option<TailorId>,
    pub name: String,
    pub price: Money,
    pub discounted_price: Option<Money>,
    pub category: String,
    pub stock_quantity: i32,
    pub is_available: bool,
    pub sales_count: i64,
    pub view_count: i64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new available product.
    ///
    /// Availability starts false when the product has no stock.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        price: Money,
        stock_quantity: i32,
    ) -> Result<Self, DomainError> {
        if !price.is_positive() {
            return Err(DomainError::InvalidPrice { price });
        }
        if stock_quantity < 0 {
            return Err(DomainError::InvalidStock {
                quantity: i64::from(stock_quantity),
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: ProductId::new(),
            tailor_id: None,
            name: name.into(),
            price,
            discounted_price: None,
            category: category.into(),
            stock_quantity,
            is_available: stock_quantity > 0,
            sales_count: 0,
            view_count: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Assigns the owning tailor.
    pub fn with_tailor(mut self, tailor_id: TailorId) -> Self {
        self.tailor_id = Some(tailor_id);
        self
    }

    /// Sets a discounted price.
    pub fn with_discount(mut self, discounted_price: Money) -> Result<Self, DomainError> {
        if !discounted_price.is_positive() {
            return Err(DomainError::InvalidPrice {
                price: discounted_price,
            });
        }
        self.discounted_price = Some(discounted_price);
        Ok(self)
    }

    /// The price a buyer pays right now.
    ///
    /// A discount only applies when it is lower than the list price.
    pub fn effective_price(&self) -> Money {
        effective_price(self.price, self.discounted_price)
    }

    /// Returns true if the product can be added to a cart or ordered.
    pub fn is_purchasable(&self) -> bool {
        !self.is_deleted && self.is_available
    }

    /// Applies a stock delta (positive restocks, negative consumes).
    ///
    /// A decrement that would cross zero is rejected in full. Reaching exactly
    /// zero marks the product unavailable; restocking does not re-enable it.
    pub fn apply_stock_delta(&mut self, delta: i32) -> Result<i32, DomainError> {
        let next = i64::from(self.stock_quantity) + i64::from(delta);
        if next < 0 {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
                requested: -i64::from(delta),
                available: self.stock_quantity,
            });
        }
        let next = i32::try_from(next).map_err(|_| DomainError::InvalidStock { quantity: next })?;

        self.stock_quantity = next;
        if next == 0 {
            self.is_available = false;
        }
        self.updated_at = Utc::now();
        Ok(next)
    }
}

/// Resolves a list price and an optional discount into the price charged.
pub fn effective_price(price: Money, discounted_price: Option<Money>) -> Money {
    match discounted_price {
        Some(discounted) if discounted < price => discounted,
        _ => price,
    }
}
