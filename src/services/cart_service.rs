use uuid::Uuid;

use crate::{
    audit,
    domain::cart::{Cart, CartItem, ensure_positive_quantity},
    dto::cart::{AddToCartRequest, CartTotal, UpdateQuantityRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
    store::{CartStore, ProductStore},
};

/// Cart operations for one user, persisted after every mutation.
pub struct CartService<'a, S> {
    store: &'a S,
}

impl<'a, S> CartService<'a, S>
where
    S: CartStore + ProductStore,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Returns the user's cart, creating an empty one if there is none yet.
    pub async fn create_cart(&self, user_id: Uuid) -> AppResult<Cart> {
        if let Some(cart) = self.store.find_cart_by_user(user_id).await? {
            return Ok(cart);
        }

        let cart = self.store.insert_cart_if_absent(&Cart::new(user_id)).await?;
        tracing::debug!(cart_id = %cart.id, %user_id, "cart ready");
        Ok(cart)
    }

    /// Loads the cart with every line re-synced to the current catalog price.
    pub async fn get_cart(&self, user_id: Uuid) -> AppResult<Cart> {
        let mut cart = self.find_cart(user_id).await?;

        let mut changed = false;
        let lines: Vec<Uuid> = cart.items.iter().map(|item| item.product_id).collect();
        for product_id in lines {
            if let Some(product) = self.store.find_product(product_id).await? {
                changed |= cart.reprice(product_id, product.price)?;
            }
        }
        if changed {
            self.store.save_cart(&cart).await?;
        }

        Ok(cart)
    }

    pub async fn add_item(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> AppResult<Cart> {
        ensure_positive_quantity(quantity)?;
        let product = self
            .store
            .find_product(product_id)
            .await?
            .ok_or(AppError::not_found("product", product_id))?;

        let mut cart = self.create_cart(user_id).await?;
        cart.add_item(product_id, product.price, quantity)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<Cart> {
        ensure_positive_quantity(quantity)?;
        let mut cart = self.find_cart(user_id).await?;
        cart.item(product_id)?;

        let product = self
            .store
            .find_product(product_id)
            .await?
            .ok_or(AppError::not_found("product", product_id))?;
        cart.update_quantity(product_id, product.price, quantity)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> AppResult<Cart> {
        let mut cart = self.find_cart(user_id).await?;
        cart.remove_item(product_id)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn get_item(&self, user_id: Uuid, product_id: Uuid) -> AppResult<CartItem> {
        let cart = self.get_cart(user_id).await?;
        cart.item(product_id).cloned()
    }

    pub async fn clear_cart(&self, user_id: Uuid) -> AppResult<()> {
        let cart = self.find_cart(user_id).await?;
        self.store.delete_cart_items(cart.id).await?;
        Ok(())
    }

    pub async fn total_price(&self, user_id: Uuid) -> AppResult<CartTotal> {
        let cart = self.get_cart(user_id).await?;
        Ok(CartTotal {
            cart_id: cart.id,
            total_amount: cart.total_amount,
        })
    }

    async fn find_cart(&self, user_id: Uuid) -> AppResult<Cart> {
        self.store
            .find_cart_by_user(user_id)
            .await?
            .ok_or(AppError::not_found("cart", user_id))
    }
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Cart>> {
    let store = state.store().begin().await?;
    let cart = CartService::new(&store).get_cart(user.user_id).await?;
    store.commit().await?;
    Ok(ApiResponse::success("OK", cart, Some(Meta::empty())))
}

pub async fn create_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Cart>> {
    let store = state.store().begin().await?;
    let cart = CartService::new(&store).create_cart(user.user_id).await?;
    store.commit().await?;
    Ok(ApiResponse::success("Cart ready", cart, Some(Meta::empty())))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<Cart>> {
    let store = state.store().begin().await?;
    let cart = CartService::new(&store)
        .add_item(user.user_id, payload.product_id, payload.quantity)
        .await?;
    store.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_add",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity }),
    )
    .await;

    Ok(ApiResponse::success("Added to cart", cart, Some(Meta::empty())))
}

pub async fn update_item_quantity(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateQuantityRequest,
) -> AppResult<ApiResponse<Cart>> {
    let store = state.store().begin().await?;
    let cart = CartService::new(&store)
        .update_item_quantity(user.user_id, product_id, payload.quantity)
        .await?;
    store.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": product_id, "quantity": payload.quantity }),
    )
    .await;

    Ok(ApiResponse::success("Quantity updated", cart, Some(Meta::empty())))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<Cart>> {
    let store = state.store().begin().await?;
    let cart = CartService::new(&store)
        .remove_item(user.user_id, product_id)
        .await?;
    store.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_remove",
        "cart_items",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::success("Removed from cart", cart, Some(Meta::empty())))
}

pub async fn get_cart_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    let store = state.store().begin().await?;
    let item = CartService::new(&store)
        .get_item(user.user_id, product_id)
        .await?;
    store.commit().await?;
    Ok(ApiResponse::success("OK", item, Some(Meta::empty())))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<serde_json::Value>> {
    let store = state.store().begin().await?;
    CartService::new(&store).clear_cart(user.user_id).await?;
    store.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_clear",
        "carts",
        serde_json::json!({}),
    )
    .await;

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn cart_total(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartTotal>> {
    let store = state.store().begin().await?;
    let total = CartService::new(&store).total_price(user.user_id).await?;
    store.commit().await?;
    Ok(ApiResponse::success("Total price", total, Some(Meta::empty())))
}
