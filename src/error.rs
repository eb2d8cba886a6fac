use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    domain::order::OrderStatus,
    response::{ApiResponse, Meta},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{resource} {id} not found")]
    ResourceNotFound { resource: &'static str, id: Uuid },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Quantity must be greater than 0, got {0}")]
    InvalidQuantity(i32),

    #[error("Product {0} is not in the cart")]
    ItemNotFound(Uuid),

    #[error("{0} is out of range")]
    OutOfRange(&'static str),

    #[error("Insufficient inventory for product {product_id}: available {available}, requested {requested}")]
    InsufficientInventory {
        product_id: Uuid,
        available: i32,
        requested: i32,
    },

    #[error("Cannot move order from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(resource: &'static str, id: Uuid) -> Self {
        AppError::ResourceNotFound { resource, id }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ResourceNotFound { .. } | AppError::ItemNotFound(_) => StatusCode::NOT_FOUND,
            AppError::EmptyCart
            | AppError::InvalidQuantity(_)
            | AppError::OutOfRange(_)
            | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::InsufficientInventory { .. } | AppError::InvalidStateTransition { .. } => {
                StatusCode::CONFLICT
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
