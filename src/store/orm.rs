use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    domain::{
        Product, User,
        cart::{Cart, CartItem},
        order::{Order, OrderItem, OrderStatus},
    },
    entity::{
        cart_items::{ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems, Model as CartItemModel},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products, Model as ProductModel},
        users::{Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    store::{CartStore, OrderStore, ProductStore, UserStore},
};

/// SeaORM-backed store over a plain connection or an open transaction.
#[derive(Debug, Clone)]
pub struct OrmStore<C = DatabaseConnection> {
    conn: C,
}

impl<C> OrmStore<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

impl OrmStore<DatabaseConnection> {
    /// Opens a transaction. Dropping the returned store without calling
    /// [`OrmStore::commit`] rolls everything back.
    pub async fn begin(&self) -> AppResult<OrmStore<DatabaseTransaction>> {
        Ok(OrmStore::new(self.conn.begin().await?))
    }
}

impl OrmStore<DatabaseTransaction> {
    pub async fn commit(self) -> AppResult<()> {
        self.conn.commit().await?;
        Ok(())
    }
}

impl<C: ConnectionTrait> OrmStore<C> {
    async fn items_for_orders(&self, order_ids: Vec<Uuid>) -> AppResult<HashMap<Uuid, Vec<OrderItem>>> {
        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(grouped);
        }

        let rows = OrderItems::find()
            .filter(OrderItemCol::OrderId.is_in(order_ids))
            .order_by_asc(OrderItemCol::CreatedAt)
            .all(&self.conn)
            .await?;
        for row in rows {
            grouped
                .entry(row.order_id)
                .or_default()
                .push(order_item_from_entity(row));
        }
        Ok(grouped)
    }
}

#[async_trait]
impl<C> CartStore for OrmStore<C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn find_cart_by_user(&self, user_id: Uuid) -> AppResult<Option<Cart>> {
        // inside a transaction the row stays locked until commit
        let cart = Carts::find()
            .filter(CartCol::UserId.eq(user_id))
            .lock_exclusive()
            .one(&self.conn)
            .await?;
        let cart = match cart {
            Some(c) => c,
            None => return Ok(None),
        };

        let items = CartItems::find()
            .filter(CartItemCol::CartId.eq(cart.id))
            .order_by_asc(CartItemCol::CreatedAt)
            .all(&self.conn)
            .await?;

        Ok(Some(cart_from_entity(cart, items)))
    }

    async fn insert_cart_if_absent(&self, cart: &Cart) -> AppResult<Cart> {
        let active = CartActive {
            id: Set(cart.id),
            user_id: Set(cart.user_id),
            total_amount: Set(cart.total_amount),
            created_at: NotSet,
            updated_at: Set(cart.updated_at.into()),
        };
        // a concurrent insert for the same user blocks here until it commits, then yields
        Carts::insert(active)
            .on_conflict(OnConflict::column(CartCol::UserId).do_nothing().to_owned())
            .exec_without_returning(&self.conn)
            .await?;

        self.find_cart_by_user(cart.user_id)
            .await?
            .ok_or(AppError::not_found("cart", cart.user_id))
    }

    async fn save_cart(&self, cart: &Cart) -> AppResult<()> {
        let active = CartActive {
            id: Set(cart.id),
            user_id: Set(cart.user_id),
            total_amount: Set(cart.total_amount),
            created_at: NotSet,
            updated_at: Set(cart.updated_at.into()),
        };
        Carts::insert(active)
            .on_conflict(
                OnConflict::column(CartCol::Id)
                    .update_columns([CartCol::TotalAmount, CartCol::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart.id))
            .exec(&self.conn)
            .await?;

        if !cart.items.is_empty() {
            let rows = cart.items.iter().map(|item| CartItemActive {
                id: Set(item.id),
                cart_id: Set(cart.id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total_price: Set(item.total_price),
                created_at: NotSet,
            });
            CartItems::insert_many(rows).exec(&self.conn).await?;
        }

        Ok(())
    }

    async fn delete_cart_items(&self, cart_id: Uuid) -> AppResult<u64> {
        let reset = Carts::update_many()
            .col_expr(CartCol::TotalAmount, Expr::value(0i64))
            .col_expr(CartCol::UpdatedAt, Expr::current_timestamp().into())
            .filter(CartCol::Id.eq(cart_id))
            .exec(&self.conn)
            .await?;
        if reset.rows_affected == 0 {
            return Err(AppError::not_found("cart", cart_id));
        }

        // the cart row stays locked by the update above until commit
        let deleted = CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart_id))
            .exec(&self.conn)
            .await?;

        Ok(deleted.rows_affected)
    }
}

#[async_trait]
impl<C> ProductStore for OrmStore<C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn find_product(&self, product_id: Uuid) -> AppResult<Option<Product>> {
        Ok(Products::find_by_id(product_id)
            .one(&self.conn)
            .await?
            .map(product_from_entity))
    }

    async fn save_product(&self, product: &Product) -> AppResult<()> {
        let active = ProductActive {
            id: Set(product.id),
            name: Set(product.name.clone()),
            description: NotSet,
            price: Set(product.price),
            stock: Set(product.stock),
            created_at: NotSet,
        };
        Products::insert(active)
            .on_conflict(
                OnConflict::column(ProdCol::Id)
                    .update_columns([ProdCol::Name, ProdCol::Price, ProdCol::Stock])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn decrement_stock_if_available(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<Product>> {
        // single conditional UPDATE; the row lock it takes serialises concurrent reservations
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(quantity))
            .filter(ProdCol::Id.eq(product_id))
            .filter(ProdCol::Stock.gte(quantity))
            .exec(&self.conn)
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.find_product(product_id).await
    }

    async fn increment_stock(&self, product_id: Uuid, quantity: i32) -> AppResult<Option<Product>> {
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(quantity))
            .filter(ProdCol::Id.eq(product_id))
            .exec(&self.conn)
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.find_product(product_id).await
    }
}

#[async_trait]
impl<C> UserStore for OrmStore<C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(Users::find_by_id(user_id)
            .one(&self.conn)
            .await?
            .map(user_from_entity))
    }
}

#[async_trait]
impl<C> OrderStore for OrmStore<C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn insert_order(&self, order: &Order) -> AppResult<()> {
        OrderActive {
            id: Set(order.id),
            user_id: Set(order.user_id),
            order_date: Set(order.order_date),
            status: Set(order.status.as_str().to_string()),
            total_amount: Set(order.total_amount),
            created_at: Set(order.created_at.into()),
            updated_at: Set(order.updated_at.into()),
        }
        .insert(&self.conn)
        .await?;

        if !order.items.is_empty() {
            let rows = order.items.iter().map(|item| OrderItemActive {
                id: Set(item.id),
                order_id: Set(order.id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                price: Set(item.price),
                created_at: NotSet,
            });
            OrderItems::insert_many(rows).exec(&self.conn).await?;
        }

        Ok(())
    }

    async fn update_status_if(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> AppResult<bool> {
        // a racing writer waits on the row lock, then re-checks the status filter and matches nothing
        let result = Orders::update_many()
            .col_expr(OrderCol::Status, Expr::value(next.as_str()))
            .col_expr(OrderCol::UpdatedAt, Expr::current_timestamp().into())
            .filter(OrderCol::Id.eq(order_id))
            .filter(OrderCol::Status.eq(expected.as_str()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn find_order(&self, order_id: Uuid) -> AppResult<Option<Order>> {
        let order = match Orders::find_by_id(order_id).one(&self.conn).await? {
            Some(o) => o,
            None => return Ok(None),
        };

        let mut items = self.items_for_orders(vec![order.id]).await?;
        let items = items.remove(&order.id).unwrap_or_default();
        Ok(Some(order_from_entity(order, items)?))
    }

    async fn find_orders_by_user(&self, user_id: Uuid) -> AppResult<Vec<Order>> {
        let orders = Orders::find()
            .filter(OrderCol::UserId.eq(user_id))
            .order_by_desc(OrderCol::CreatedAt)
            .all(&self.conn)
            .await?;

        let mut items = self
            .items_for_orders(orders.iter().map(|o| o.id).collect())
            .await?;

        orders
            .into_iter()
            .map(|order| {
                let order_items = items.remove(&order.id).unwrap_or_default();
                order_from_entity(order, order_items)
            })
            .collect()
    }
}

fn cart_from_entity(model: CartModel, items: Vec<CartItemModel>) -> Cart {
    Cart {
        id: model.id,
        user_id: model.user_id,
        items: items
            .into_iter()
            .map(|item| CartItem {
                id: item.id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
            })
            .collect(),
        total_amount: model.total_amount,
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        name: model.name,
        price: model.price,
        stock: model.stock,
    }
}

fn user_from_entity(model: UserModel) -> User {
    User {
        id: model.id,
        email: model.email,
        role: model.role,
    }
}

fn order_from_entity(model: OrderModel, items: Vec<OrderItem>) -> AppResult<Order> {
    let status: OrderStatus = model.status.parse().map_err(|_| {
        AppError::Internal(anyhow::anyhow!(
            "order {} has unknown status {}",
            model.id,
            model.status
        ))
    })?;

    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        order_date: model.order_date,
        status,
        total_amount: model.total_amount,
        items,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
    }
}
