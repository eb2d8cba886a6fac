use async_trait::async_trait;
use shop_checkout::{
    domain::{
        Product, User,
        cart::Cart,
        order::{Order, OrderStatus},
    },
    error::{AppError, AppResult},
    services::{cart_service::CartService, order_service::OrderService},
    store::{CartStore, MemoryStore, OrderStore, ProductStore, UserStore},
};
use uuid::Uuid;

struct Fixture {
    store: MemoryStore,
    user_id: Uuid,
}

impl Fixture {
    fn new() -> Self {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .insert_user(User {
                id: user_id,
                email: "buyer@example.com".into(),
                role: "user".into(),
            })
            .unwrap();
        Self { store, user_id }
    }

    fn product(&self, name: &str, price: i64, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_product(Product {
                id,
                name: name.into(),
                price,
                stock,
            })
            .unwrap();
        id
    }

    async fn stock(&self, product_id: Uuid) -> i32 {
        self.store.find_product(product_id).await.unwrap().unwrap().stock
    }

    async fn set_price(&self, product_id: Uuid, price: i64) {
        let mut product = self.store.find_product(product_id).await.unwrap().unwrap();
        product.price = price;
        self.store.save_product(&product).await.unwrap();
    }

    async fn add(&self, product_id: Uuid, quantity: i32) {
        CartService::new(&self.store)
            .add_item(self.user_id, product_id, quantity)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn insufficient_line_leaves_all_inventory_untouched() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    let b = fx.product("B", 50, 1);
    fx.add(a, 2).await;
    fx.add(b, 2).await;

    let err = OrderService::new(&fx.store)
        .place_order(fx.user_id)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::InsufficientInventory {
            available: 1,
            requested: 2,
            ..
        }
    ));
    assert_eq!(fx.stock(a).await, 10);
    assert_eq!(fx.stock(b).await, 1);
    assert_eq!(fx.store.order_count().unwrap(), 0);

    let cart = fx.store.find_cart_by_user(fx.user_id).await.unwrap().unwrap();
    assert_eq!(cart.items.len(), 2);
}

#[tokio::test]
async fn placing_order_reserves_stock_and_empties_cart() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    let b = fx.product("B", 50, 2);
    fx.add(a, 2).await;
    fx.add(b, 2).await;

    let order = OrderService::new(&fx.store)
        .place_order(fx.user_id)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, 300);
    assert_eq!(order.items.len(), 2);
    assert_eq!(fx.stock(a).await, 8);
    assert_eq!(fx.stock(b).await, 0);

    let cart = fx.store.find_cart_by_user(fx.user_id).await.unwrap().unwrap();
    assert!(cart.is_empty());
    assert_eq!(cart.total_amount, 0);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    CartService::new(&fx.store).create_cart(fx.user_id).await.unwrap();

    let err = OrderService::new(&fx.store)
        .place_order(fx.user_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::EmptyCart));
    assert_eq!(fx.stock(a).await, 10);
    assert_eq!(fx.store.order_count().unwrap(), 0);
}

#[tokio::test]
async fn missing_cart_or_user_is_not_found() {
    let fx = Fixture::new();
    let orders = OrderService::new(&fx.store);

    assert!(matches!(
        orders.place_order(fx.user_id).await,
        Err(AppError::ResourceNotFound { resource: "cart", .. })
    ));

    let ghost = Uuid::new_v4();
    let a = fx.product("A", 100, 10);
    CartService::new(&fx.store).add_item(ghost, a, 1).await.unwrap();
    assert!(matches!(
        orders.place_order(ghost).await,
        Err(AppError::ResourceNotFound { resource: "user", .. })
    ));
    assert_eq!(fx.stock(a).await, 10);
}

#[tokio::test]
async fn order_prices_are_frozen_at_placement() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    fx.add(a, 3).await;

    // catalog change before checkout is picked up
    fx.set_price(a, 120).await;
    let orders = OrderService::new(&fx.store);
    let placed = orders.place_order(fx.user_id).await.unwrap();
    assert_eq!(placed.total_amount, 360);

    // catalog change after checkout is not
    fx.set_price(a, 999).await;
    let fetched = orders.get_order(placed.id).await.unwrap();
    assert_eq!(fetched.items[0].price, 120);
    assert_eq!(fetched.total_amount, 360);
}

#[tokio::test]
async fn cancel_restores_inventory() {
    for status in [OrderStatus::Pending, OrderStatus::Processing] {
        let fx = Fixture::new();
        let a = fx.product("A", 100, 10);
        let b = fx.product("B", 50, 5);
        fx.add(a, 4).await;
        fx.add(b, 5).await;

        let orders = OrderService::new(&fx.store);
        let order = orders.place_order(fx.user_id).await.unwrap();
        if status != OrderStatus::Pending {
            orders.update_order_status(order.id, status).await.unwrap();
        }

        let cancelled = orders.cancel_order(order.id).await.unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(fx.stock(a).await, 10);
        assert_eq!(fx.stock(b).await, 5);
        assert_eq!(
            orders.get_order(order.id).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }
}

#[tokio::test]
async fn cannot_cancel_after_shipping() {
    for status in [OrderStatus::Shipped, OrderStatus::Delivered] {
        let fx = Fixture::new();
        let a = fx.product("A", 100, 10);
        fx.add(a, 4).await;

        let orders = OrderService::new(&fx.store);
        let order = orders.place_order(fx.user_id).await.unwrap();
        orders.update_order_status(order.id, status).await.unwrap();

        let err = orders.cancel_order(order.id).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::InvalidStateTransition {
                to: OrderStatus::Cancelled,
                ..
            }
        ));
        assert_eq!(fx.stock(a).await, 6);
        assert_eq!(orders.get_order(order.id).await.unwrap().status, status);
    }
}

#[tokio::test]
async fn cancelling_twice_does_not_restock_twice() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    fx.add(a, 4).await;

    let orders = OrderService::new(&fx.store);
    let order = orders.place_order(fx.user_id).await.unwrap();
    orders.cancel_order(order.id).await.unwrap();

    assert!(matches!(
        orders.cancel_order(order.id).await,
        Err(AppError::InvalidStateTransition { .. })
    ));
    assert_eq!(fx.stock(a).await, 10);
}

#[tokio::test]
async fn status_updates_stop_at_terminal_states() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    fx.add(a, 1).await;

    let orders = OrderService::new(&fx.store);
    let order = orders.place_order(fx.user_id).await.unwrap();

    orders.update_order_status(order.id, OrderStatus::Shipped).await.unwrap();
    orders.update_order_status(order.id, OrderStatus::Processing).await.unwrap();
    orders.update_order_status(order.id, OrderStatus::Delivered).await.unwrap();

    let err = orders
        .update_order_status(order.id, OrderStatus::Processing)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Processing
        }
    ));
}

#[tokio::test]
async fn status_update_to_cancelled_restocks() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    fx.add(a, 3).await;

    let orders = OrderService::new(&fx.store);
    let order = orders.place_order(fx.user_id).await.unwrap();
    let updated = orders
        .update_order_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(updated.status, OrderStatus::Cancelled);
    assert_eq!(fx.stock(a).await, 10);
}

#[tokio::test]
async fn user_orders_require_existing_user() {
    let fx = Fixture::new();
    let orders = OrderService::new(&fx.store);

    assert!(orders.get_user_orders(fx.user_id).await.unwrap().is_empty());
    assert!(matches!(
        orders.get_user_orders(Uuid::new_v4()).await,
        Err(AppError::ResourceNotFound { resource: "user", .. })
    ));
    assert!(matches!(
        orders.get_order(Uuid::new_v4()).await,
        Err(AppError::ResourceNotFound { resource: "order", .. })
    ));

    let a = fx.product("A", 100, 10);
    fx.add(a, 1).await;
    let placed = orders.place_order(fx.user_id).await.unwrap();
    let listed = orders.get_user_orders(fx.user_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, placed.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_placements_never_oversell() {
    let store = MemoryStore::new();
    let product_id = Uuid::new_v4();
    store
        .insert_product(Product {
            id: product_id,
            name: "Last units".into(),
            price: 10,
            stock: 3,
        })
        .unwrap();

    let mut buyers = Vec::new();
    for i in 0..10 {
        let user_id = Uuid::new_v4();
        store
            .insert_user(User {
                id: user_id,
                email: format!("buyer{i}@example.com"),
                role: "user".into(),
            })
            .unwrap();
        CartService::new(&store)
            .add_item(user_id, product_id, 1)
            .await
            .unwrap();
        buyers.push(user_id);
    }

    let mut handles = Vec::new();
    for user_id in buyers {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            OrderService::new(&store).place_order(user_id).await
        }));
    }

    let mut placed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(AppError::InsufficientInventory { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(placed, 3);
    assert_eq!(rejected, 7);
    assert_eq!(store.find_product(product_id).await.unwrap().unwrap().stock, 0);
    assert_eq!(store.order_count().unwrap(), 3);
}

/// Memory store whose order table refuses every insert.
struct RejectingOrders(MemoryStore);

#[async_trait]
impl CartStore for RejectingOrders {
    async fn find_cart_by_user(&self, user_id: Uuid) -> AppResult<Option<Cart>> {
        self.0.find_cart_by_user(user_id).await
    }

    async fn insert_cart_if_absent(&self, cart: &Cart) -> AppResult<Cart> {
        self.0.insert_cart_if_absent(cart).await
    }

    async fn save_cart(&self, cart: &Cart) -> AppResult<()> {
        self.0.save_cart(cart).await
    }

    async fn delete_cart_items(&self, cart_id: Uuid) -> AppResult<u64> {
        self.0.delete_cart_items(cart_id).await
    }
}

#[async_trait]
impl ProductStore for RejectingOrders {
    async fn find_product(&self, product_id: Uuid) -> AppResult<Option<Product>> {
        self.0.find_product(product_id).await
    }

    async fn save_product(&self, product: &Product) -> AppResult<()> {
        self.0.save_product(product).await
    }

    async fn decrement_stock_if_available(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<Product>> {
        self.0.decrement_stock_if_available(product_id, quantity).await
    }

    async fn increment_stock(&self, product_id: Uuid, quantity: i32) -> AppResult<Option<Product>> {
        self.0.increment_stock(product_id, quantity).await
    }
}

#[async_trait]
impl UserStore for RejectingOrders {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        self.0.find_user(user_id).await
    }
}

#[async_trait]
impl OrderStore for RejectingOrders {
    async fn insert_order(&self, _order: &Order) -> AppResult<()> {
        Err(AppError::Internal(anyhow::anyhow!("orders table unavailable")))
    }

    async fn update_status_if(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> AppResult<bool> {
        self.0.update_status_if(order_id, expected, next).await
    }

    async fn find_order(&self, order_id: Uuid) -> AppResult<Option<Order>> {
        self.0.find_order(order_id).await
    }

    async fn find_orders_by_user(&self, user_id: Uuid) -> AppResult<Vec<Order>> {
        self.0.find_orders_by_user(user_id).await
    }
}

#[tokio::test]
async fn failed_order_write_releases_reservations_and_keeps_cart() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    let b = fx.product("B", 50, 2);
    fx.add(a, 2).await;
    fx.add(b, 2).await;

    let store = RejectingOrders(fx.store.clone());
    let err = OrderService::new(&store)
        .place_order(fx.user_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Internal(_)));
    assert_eq!(fx.stock(a).await, 10);
    assert_eq!(fx.stock(b).await, 2);
    assert_eq!(fx.store.order_count().unwrap(), 0);

    let cart = fx.store.find_cart_by_user(fx.user_id).await.unwrap().unwrap();
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.total_amount, 300);
}

#[tokio::test]
async fn overflowing_order_total_rolls_back() {
    let fx = Fixture::new();
    let a = fx.product("A", 1, 10);
    let b = fx.product("B", 1, 10);
    fx.add(a, 1).await;
    fx.add(b, 1).await;
    fx.set_price(a, i64::MAX).await;

    let err = OrderService::new(&fx.store)
        .place_order(fx.user_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::OutOfRange(_)));
    assert_eq!(fx.stock(a).await, 10);
    assert_eq!(fx.stock(b).await, 10);
    assert_eq!(fx.store.order_count().unwrap(), 0);
    let cart = fx.store.find_cart_by_user(fx.user_id).await.unwrap().unwrap();
    assert_eq!(cart.items.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_checkouts_of_one_cart_place_one_order() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    fx.add(a, 2).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = fx.store.clone();
        let user_id = fx.user_id;
        handles.push(tokio::spawn(async move {
            OrderService::new(&store).place_order(user_id).await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(AppError::EmptyCart) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(fx.store.order_count().unwrap(), 1);
    assert_eq!(fx.stock(a).await, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_cancels_restock_once() {
    let fx = Fixture::new();
    let a = fx.product("A", 100, 10);
    fx.add(a, 4).await;
    let order = OrderService::new(&fx.store)
        .place_order(fx.user_id)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = fx.store.clone();
        let order_id = order.id;
        handles.push(tokio::spawn(async move {
            OrderService::new(&store).cancel_order(order_id).await
        }));
    }

    let mut cancelled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => cancelled += 1,
            Err(AppError::InvalidStateTransition { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(cancelled, 1);
    assert_eq!(fx.stock(a).await, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_shipment_leaves_consistent_stock() {
    for _ in 0..20 {
        let fx = Fixture::new();
        let a = fx.product("A", 100, 10);
        fx.add(a, 4).await;
        let order = OrderService::new(&fx.store)
            .place_order(fx.user_id)
            .await
            .unwrap();
        let order_id = order.id;

        let cancel = {
            let store = fx.store.clone();
            tokio::spawn(async move { OrderService::new(&store).cancel_order(order_id).await })
        };
        let ship = {
            let store = fx.store.clone();
            tokio::spawn(async move {
                OrderService::new(&store)
                    .update_order_status(order_id, OrderStatus::Shipped)
                    .await
            })
        };
        let cancelled = cancel.await.unwrap().is_ok();
        let shipped = ship.await.unwrap().is_ok();

        assert!(cancelled != shipped, "exactly one of cancel and ship must win");
        let status = OrderService::new(&fx.store)
            .get_order(order_id)
            .await
            .unwrap()
            .status;
        if cancelled {
            assert_eq!(status, OrderStatus::Cancelled);
            assert_eq!(fx.stock(a).await, 10);
        } else {
            assert_eq!(status, OrderStatus::Shipped);
            assert_eq!(fx.stock(a).await, 6);
        }
    }
}
