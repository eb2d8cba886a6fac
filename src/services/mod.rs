pub mod cart_service;
pub mod inventory;
pub mod order_service;
