use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    domain::{
        cart::{Cart, CartItem},
        order::{Order, OrderItem, OrderStatus},
    },
    dto::{
        cart::{AddToCartRequest, CartTotal, UpdateQuantityRequest},
        orders::{OrderList, UpdateOrderStatusRequest},
    },
    response::{ApiResponse, Meta},
    routes::{admin, cart, health, orders},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::get_cart,
        cart::create_cart,
        cart::add_to_cart,
        cart::get_cart_item,
        cart::update_item_quantity,
        cart::remove_from_cart,
        cart::clear_cart,
        cart::cart_total,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_user_orders
    ),
    components(
        schemas(
            Cart,
            CartItem,
            CartTotal,
            AddToCartRequest,
            UpdateQuantityRequest,
            Order,
            OrderItem,
            OrderStatus,
            OrderList,
            UpdateOrderStatusRequest,
            Meta,
            ApiResponse<Cart>,
            ApiResponse<CartItem>,
            ApiResponse<CartTotal>,
            ApiResponse<Order>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order placement and lifecycle"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
