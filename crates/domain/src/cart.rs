//! Shopping cart aggregate.

use chrono::{DateTime, Duration, Utc};
use common::{CartId, CartItemId, CustomerId, Money, ProductId, TailorId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A customer's cart. Items are stored separately; totals are always derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingCart {
    pub id: CartId,
    pub customer_id: CustomerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl ShoppingCart {
    /// Creates an active cart that expires after `ttl` of inactivity.
    pub fn new(customer_id: CustomerId, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            customer_id,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
            is_active: true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Records activity, pushing expiry out by `ttl`.
    pub fn touch(&mut self, ttl: Duration, now: DateTime<Utc>) {
        self.updated_at = now;
        self.expires_at = now + ttl;
    }
}

/// Normalizes a size/color selection so `""`, `"  "` and `None` compare equal.
pub fn normalize_variant(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A selected product in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        size: Option<String>,
        color: Option<String>,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity: 0 });
        }
        Ok(Self {
            id: CartItemId::new(),
            cart_id,
            product_id,
            quantity,
            size: normalize_variant(size),
            color: normalize_variant(color),
            added_at: Utc::now(),
        })
    }

    /// Returns true if this line has the same merge identity.
    pub fn matches(&self, product_id: ProductId, size: &Option<String>, color: &Option<String>) -> bool {
        self.product_id == product_id && &self.size == size && &self.color == color
    }
}

/// A cart item joined with the live product view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item: CartItem,
    pub product_name: String,
    pub tailor_id: Option<TailorId>,
    /// Effective price read at query time, never a frozen snapshot.
    pub unit_price: Money,
    pub is_available: bool,
    pub is_deleted: bool,
    pub stock_quantity: i32,
}

impl CartLine {
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.unit_price
            .checked_mul(self.item.quantity)
            .ok_or(DomainError::AmountOverflow)
    }
}

/// Derived cart totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub cart_id: CartId,
    pub lines: Vec<CartLine>,
    pub subtotal: Money,
    pub item_count: u64,
}

impl CartSummary {
    pub fn from_lines(cart_id: CartId, lines: Vec<CartLine>) -> Result<Self, DomainError> {
        let totals = lines
            .iter()
            .map(CartLine::line_total)
            .collect::<Result<Vec<_>, _>>()?;
        let subtotal = Money::checked_sum(totals).ok_or(DomainError::AmountOverflow)?;
        let item_count = lines.iter().map(|l| u64::from(l.item.quantity)).sum();
        Ok(Self {
            cart_id,
            lines,
            subtotal,
            item_count,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
