use uuid::Uuid;

use crate::{
    audit,
    domain::{
        cart::Cart,
        order::{Order, OrderItem, OrderStatus},
    },
    dto::orders::OrderList,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    services::inventory::InventoryLedger,
    state::AppState,
    store::CheckoutStore,
};

/// Turns carts into orders and drives the order status machine.
pub struct OrderService<'a, S> {
    store: &'a S,
}

impl<'a, S: CheckoutStore> OrderService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Places an order from the user's cart.
    ///
    /// The cart's lines are claimed first, so one cart turns into at most one
    /// order even when placements race. Stock for every line is then
    /// reserved. If any line cannot be reserved, or the order cannot be
    /// stored, reservations already taken are released and the cart lines are
    /// put back before the error is returned.
    pub async fn place_order(&self, user_id: Uuid) -> AppResult<Order> {
        let cart = self
            .store
            .find_cart_by_user(user_id)
            .await?
            .ok_or(AppError::not_found("cart", user_id))?;
        if cart.is_empty() {
            return Err(AppError::EmptyCart);
        }

        self.store
            .find_user(user_id)
            .await?
            .ok_or(AppError::not_found("user", user_id))?;

        // another placement emptied the cart between our read and the claim
        if self.store.delete_cart_items(cart.id).await? == 0 {
            return Err(AppError::EmptyCart);
        }

        let ledger = InventoryLedger::new(self.store);
        let mut items = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            match ledger.reserve(line.product_id, line.quantity).await {
                // price floats with the catalog until here, then freezes in the order
                Ok(product) => items.push(OrderItem::new(line.product_id, line.quantity, product.price)),
                Err(err) => {
                    tracing::warn!(%user_id, product_id = %line.product_id, error = %err, "order placement rejected");
                    self.roll_back(&ledger, &items, &cart).await;
                    return Err(err);
                }
            }
        }

        let order = match Order::place(user_id, items.clone()) {
            Ok(order) => order,
            Err(err) => {
                self.roll_back(&ledger, &items, &cart).await;
                return Err(err);
            }
        };
        if let Err(err) = self.store.insert_order(&order).await {
            tracing::warn!(%user_id, error = %err, "order could not be stored");
            self.roll_back(&ledger, &order.items, &cart).await;
            return Err(err);
        }

        tracing::info!(
            order_id = %order.id,
            %user_id,
            total_amount = order.total_amount,
            lines = order.items.len(),
            "order placed"
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> AppResult<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or(AppError::not_found("order", order_id))
    }

    pub async fn get_user_orders(&self, user_id: Uuid) -> AppResult<Vec<Order>> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or(AppError::not_found("user", user_id))?;
        self.store.find_orders_by_user(user_id).await
    }

    /// Sets a new status. Moving to `CANCELLED` goes through
    /// [`OrderService::cancel_order`] so stock is returned.
    pub async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> AppResult<Order> {
        if status == OrderStatus::Cancelled {
            return self.cancel_order(order_id).await;
        }

        loop {
            let mut order = self.get_order(order_id).await?;
            let previous = order.status;
            order.transition_to(status)?;

            if self.store.update_status_if(order_id, previous, status).await? {
                tracing::info!(%order_id, from = %previous, to = %status, "order status updated");
                return Ok(order);
            }
            tracing::debug!(%order_id, "order status changed concurrently, re-reading");
        }
    }

    /// Cancels a pending or processing order and puts its stock back.
    ///
    /// The status write is conditional on the status that was read, so among
    /// racing cancels only one wins and stock is returned once.
    pub async fn cancel_order(&self, order_id: Uuid) -> AppResult<Order> {
        let order = loop {
            let mut order = self.get_order(order_id).await?;
            let previous = order.status;
            order.cancel()?;

            if self
                .store
                .update_status_if(order_id, previous, OrderStatus::Cancelled)
                .await?
            {
                break order;
            }
            tracing::debug!(%order_id, "order status changed concurrently, re-reading");
        };

        let ledger = InventoryLedger::new(self.store);
        for item in &order.items {
            ledger.release(item.product_id, item.quantity).await?;
        }

        tracing::info!(%order_id, lines = order.items.len(), "order cancelled");
        Ok(order)
    }

    async fn roll_back(&self, ledger: &InventoryLedger<'_, S>, items: &[OrderItem], cart: &Cart) {
        for item in items {
            if let Err(err) = ledger.release(item.product_id, item.quantity).await {
                tracing::error!(
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    error = %err,
                    "failed to roll back reservation"
                );
            }
        }
        if let Err(err) = self.store.save_cart(cart).await {
            tracing::error!(cart_id = %cart.id, error = %err, "failed to restore cart lines");
        }
    }
}

pub async fn place_order(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Order>> {
    let store = state.store().begin().await?;
    let order = OrderService::new(&store).place_order(user.user_id).await?;
    store.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "order_place",
        "orders",
        serde_json::json!({ "order_id": order.id, "total_amount": order.total_amount }),
    )
    .await;

    Ok(ApiResponse::success("Order placed", order, Some(Meta::empty())))
}

pub async fn get_order(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Order>> {
    let store = state.store();
    let order = OrderService::new(&store).get_order(id).await?;
    if !user.can_access(order.user_id) {
        return Err(AppError::not_found("order", id));
    }

    Ok(ApiResponse::success("OK", order, Some(Meta::empty())))
}

pub async fn list_user_orders(
    state: &AppState,
    user: &AuthUser,
    user_id: Uuid,
) -> AppResult<ApiResponse<OrderList>> {
    if !user.can_access(user_id) {
        return Err(AppError::Forbidden);
    }

    let store = state.store();
    let orders = OrderService::new(&store).get_user_orders(user_id).await?;
    let meta = Meta::all(orders.len());
    let message = if orders.is_empty() {
        "No orders found for this user"
    } else {
        "Ok"
    };
    Ok(ApiResponse::success(message, OrderList { items: orders }, Some(meta)))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    status: OrderStatus,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let store = state.store().begin().await?;
    let order = OrderService::new(&store).update_order_status(id, status).await?;
    store.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "status": order.status }),
    )
    .await;

    Ok(ApiResponse::success("Order updated", order, Some(Meta::empty())))
}

pub async fn cancel_order(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Order>> {
    let store = state.store().begin().await?;
    let service = OrderService::new(&store);

    let existing = service.get_order(id).await?;
    if !user.can_access(existing.user_id) {
        return Err(AppError::not_found("order", id));
    }
    let order = service.cancel_order(id).await?;
    store.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "order_cancel",
        "orders",
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success("Order cancelled", order, Some(Meta::empty())))
}
