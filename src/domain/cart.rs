use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// A line of a cart. `unit_price` is a snapshot of the catalog price and is
/// re-synced until checkout; `total_price` is always `unit_price * quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
}

impl CartItem {
    fn new(product_id: Uuid, unit_price: i64, quantity: i32) -> AppResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            product_id,
            quantity,
            unit_price,
            total_price: line_total(unit_price, quantity)?,
        })
    }

    fn set(&mut self, unit_price: i64, quantity: i32) -> AppResult<()> {
        self.total_price = line_total(unit_price, quantity)?;
        self.unit_price = unit_price;
        self.quantity = quantity;
        Ok(())
    }
}

/// A user's shopping cart. Holds at most one line per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub total_amount: i64,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            items: Vec::new(),
            total_amount: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: Uuid) -> AppResult<&CartItem> {
        self.items
            .iter()
            .find(|item| item.product_id == product_id)
            .ok_or(AppError::ItemNotFound(product_id))
    }

    /// Adds `quantity` of a product. An existing line keeps its unit price and
    /// grows; a new line takes `unit_price`.
    ///
    /// Every mutation is applied to a copy of the lines first, so a rejected
    /// change leaves the cart exactly as it was.
    pub fn add_item(&mut self, product_id: Uuid, unit_price: i64, quantity: i32) -> AppResult<&CartItem> {
        ensure_positive_quantity(quantity)?;

        let mut items = self.items.clone();
        let index = match self.position(product_id) {
            Some(index) => {
                let item = &mut items[index];
                let merged = item
                    .quantity
                    .checked_add(quantity)
                    .ok_or(AppError::OutOfRange("quantity"))?;
                let price = item.unit_price;
                item.set(price, merged)?;
                index
            }
            None => {
                items.push(CartItem::new(product_id, unit_price, quantity)?);
                items.len() - 1
            }
        };

        self.replace_items(items)?;
        Ok(&self.items[index])
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> AppResult<CartItem> {
        let index = self
            .position(product_id)
            .ok_or(AppError::ItemNotFound(product_id))?;
        let mut items = self.items.clone();
        let removed = items.remove(index);
        self.replace_items(items)?;
        Ok(removed)
    }

    /// Sets the quantity of an existing line and re-syncs its unit price.
    pub fn update_quantity(
        &mut self,
        product_id: Uuid,
        unit_price: i64,
        quantity: i32,
    ) -> AppResult<&CartItem> {
        ensure_positive_quantity(quantity)?;
        let index = self
            .position(product_id)
            .ok_or(AppError::ItemNotFound(product_id))?;

        let mut items = self.items.clone();
        items[index].set(unit_price, quantity)?;

        self.replace_items(items)?;
        Ok(&self.items[index])
    }

    /// Re-syncs a line to the current catalog price. Returns whether it changed.
    pub fn reprice(&mut self, product_id: Uuid, unit_price: i64) -> AppResult<bool> {
        let index = self
            .position(product_id)
            .ok_or(AppError::ItemNotFound(product_id))?;
        if self.items[index].unit_price == unit_price {
            return Ok(false);
        }

        let mut items = self.items.clone();
        let quantity = items[index].quantity;
        items[index].set(unit_price, quantity)?;

        self.replace_items(items)?;
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.total_amount = 0;
        self.updated_at = Utc::now();
    }

    fn position(&self, product_id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.product_id == product_id)
    }

    fn replace_items(&mut self, items: Vec<CartItem>) -> AppResult<()> {
        self.total_amount = sum_amounts(items.iter().map(|item| item.total_price))?;
        self.items = items;
        self.updated_at = Utc::now();
        Ok(())
    }
}

pub fn ensure_positive_quantity(quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// `unit_price * quantity`, rejecting results that do not fit in an `i64`.
pub fn line_total(unit_price: i64, quantity: i32) -> AppResult<i64> {
    unit_price
        .checked_mul(i64::from(quantity))
        .ok_or(AppError::OutOfRange("line total"))
}

pub fn sum_amounts(amounts: impl IntoIterator<Item = i64>) -> AppResult<i64> {
    amounts.into_iter().try_fold(0i64, |acc, amount| {
        acc.checked_add(amount).ok_or(AppError::OutOfRange("total amount"))
    })
}
