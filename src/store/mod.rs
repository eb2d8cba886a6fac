//! Persistence collaborators used by the checkout services.
//!
//! The services only see these traits; [`OrmStore`] backs them with Postgres
//! through SeaORM and [`MemoryStore`] keeps everything in process.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    domain::{
        Product, User,
        cart::Cart,
        order::{Order, OrderStatus},
    },
    error::AppResult,
};

pub mod memory;
pub mod orm;

pub use memory::MemoryStore;
pub use orm::OrmStore;

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Loads the user's cart. Transactional stores hold the cart row until
    /// the transaction ends, so cart read-modify-write cycles serialise.
    async fn find_cart_by_user(&self, user_id: Uuid) -> AppResult<Option<Cart>>;

    /// Stores the new, empty `cart` unless the user already has one, and
    /// returns whichever cart the user owns afterwards.
    async fn insert_cart_if_absent(&self, cart: &Cart) -> AppResult<Cart>;

    /// Upserts the cart row and replaces its line items.
    async fn save_cart(&self, cart: &Cart) -> AppResult<()>;

    /// Deletes every line of the cart and resets its total to zero. Returns
    /// how many lines were removed; concurrent callers see the lines go
    /// exactly once.
    async fn delete_cart_items(&self, cart_id: Uuid) -> AppResult<u64>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_product(&self, product_id: Uuid) -> AppResult<Option<Product>>;

    async fn save_product(&self, product: &Product) -> AppResult<()>;

    /// Decrements stock by `quantity` only if at least that much is on hand.
    /// Returns the updated product, or `None` if the stock was too low.
    /// Check and write happen as one atomic step.
    async fn decrement_stock_if_available(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<Product>>;

    /// Returns `None` if the product does not exist.
    async fn increment_stock(&self, product_id: Uuid, quantity: i32) -> AppResult<Option<Product>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order with its items. Items and amounts are never
    /// rewritten afterwards.
    async fn insert_order(&self, order: &Order) -> AppResult<()>;

    /// Moves the order from `expected` to `next` in one conditional write.
    /// Returns `false` if the order is no longer in `expected`.
    async fn update_status_if(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> AppResult<bool>;

    async fn find_order(&self, order_id: Uuid) -> AppResult<Option<Order>>;

    /// Orders of a user, newest first.
    async fn find_orders_by_user(&self, user_id: Uuid) -> AppResult<Vec<Order>>;
}

/// Everything the checkout workflow needs from storage.
pub trait CheckoutStore: CartStore + ProductStore + UserStore + OrderStore {}

impl<T> CheckoutStore for T where T: CartStore + ProductStore + UserStore + OrderStore {}
