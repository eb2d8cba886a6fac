//! Cart-to-order checkout backend: cart aggregate, stock reservations and the
//! order lifecycle, exposed over axum.

pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
pub mod dto;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
