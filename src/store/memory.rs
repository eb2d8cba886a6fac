use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    domain::{
        Product, User,
        cart::Cart,
        order::{Order, OrderStatus},
    },
    error::{AppError, AppResult},
    store::{CartStore, OrderStore, ProductStore, UserStore},
};

#[derive(Debug, Default)]
struct Tables {
    carts: HashMap<Uuid, Cart>,
    products: HashMap<Uuid, Product>,
    users: HashMap<Uuid, User>,
    orders: HashMap<Uuid, Order>,
}

/// In-process store. Clones share the same tables.
///
/// Every operation runs under a single lock, so a stock check and the
/// decrement that follows it can never interleave with another writer.
/// There are no transactions: callers undo partial work themselves.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) -> AppResult<()> {
        self.write()?.users.insert(user.id, user);
        Ok(())
    }

    pub fn insert_product(&self, product: Product) -> AppResult<()> {
        self.write()?.products.insert(product.id, product);
        Ok(())
    }

    pub fn order_count(&self) -> AppResult<usize> {
        Ok(self.read()?.orders.len())
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("memory store lock poisoned")))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("memory store lock poisoned")))
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn find_cart_by_user(&self, user_id: Uuid) -> AppResult<Option<Cart>> {
        let tables = self.read()?;
        Ok(tables
            .carts
            .values()
            .find(|cart| cart.user_id == user_id)
            .cloned())
    }

    async fn insert_cart_if_absent(&self, cart: &Cart) -> AppResult<Cart> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.carts.values().find(|c| c.user_id == cart.user_id) {
            return Ok(existing.clone());
        }
        tables.carts.insert(cart.id, cart.clone());
        Ok(cart.clone())
    }

    async fn save_cart(&self, cart: &Cart) -> AppResult<()> {
        self.write()?.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn delete_cart_items(&self, cart_id: Uuid) -> AppResult<u64> {
        let mut tables = self.write()?;
        let cart = tables
            .carts
            .get_mut(&cart_id)
            .ok_or(AppError::not_found("cart", cart_id))?;
        let removed = cart.items.len() as u64;
        cart.clear();
        Ok(removed)
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn find_product(&self, product_id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.read()?.products.get(&product_id).cloned())
    }

    async fn save_product(&self, product: &Product) -> AppResult<()> {
        self.write()?.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn decrement_stock_if_available(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<Product>> {
        let mut tables = self.write()?;
        match tables.products.get_mut(&product_id) {
            Some(product) if product.stock >= quantity => {
                product.stock -= quantity;
                Ok(Some(product.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn increment_stock(&self, product_id: Uuid, quantity: i32) -> AppResult<Option<Product>> {
        let mut tables = self.write()?;
        let Some(product) = tables.products.get_mut(&product_id) else {
            return Ok(None);
        };
        product.stock = product
            .stock
            .checked_add(quantity)
            .ok_or(AppError::OutOfRange("stock"))?;
        Ok(Some(product.clone()))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.read()?.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> AppResult<()> {
        self.write()?.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_status_if(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> AppResult<bool> {
        let mut tables = self.write()?;
        match tables.orders.get_mut(&order_id) {
            Some(order) if order.status == expected => {
                order.status = next;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_order(&self, order_id: Uuid) -> AppResult<Option<Order>> {
        Ok(self.read()?.orders.get(&order_id).cloned())
    }

    async fn find_orders_by_user(&self, user_id: Uuid) -> AppResult<Vec<Order>> {
        let tables = self.read()?;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}
