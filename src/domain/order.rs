use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    domain::cart::{line_total, sum_amounts},
    error::{AppError, AppResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Only orders that have not left the warehouse can be cancelled.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| AppError::BadRequest(format!("Invalid order status {value}")))
    }
}

/// Snapshot of a purchased line. `price` is the unit price at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: i64,
}

impl OrderItem {
    pub fn new(product_id: Uuid, quantity: i32, price: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            quantity,
            price,
        }
    }

    pub fn line_total(&self) -> AppResult<i64> {
        line_total(self.price, self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_date: NaiveDate,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn place(user_id: Uuid, items: Vec<OrderItem>) -> AppResult<Self> {
        let now = Utc::now();
        let totals = items
            .iter()
            .map(OrderItem::line_total)
            .collect::<AppResult<Vec<_>>>()?;
        let total_amount = sum_amounts(totals)?;
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            order_date: now.date_naive(),
            status: OrderStatus::Pending,
            total_amount,
            items,
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves the order to `next`. Terminal orders never move again.
    pub fn transition_to(&mut self, next: OrderStatus) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(AppError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn cancel(&mut self) -> AppResult<()> {
        if !self.status.is_cancellable() {
            return Err(AppError::InvalidStateTransition {
                from: self.status,
                to: OrderStatus::Cancelled,
            });
        }
        self.transition_to(OrderStatus::Cancelled)
    }
}
