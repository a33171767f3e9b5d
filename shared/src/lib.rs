use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod auth;
pub mod error;
pub mod pricing;
pub mod status;

pub use auth::{Action, AuthorizationGate, Principal, Resource, Role, RolePolicy};
pub use error::OrderError;
pub use status::OrderStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: i32,
    pub user_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: i32,
    pub cart_id: i32,
    pub product_id: i32,
    pub quantity: i32,
}

/// A cart together with its lines, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartContents {
    pub id: i32,
    pub items: Vec<CartItem>,
}

/// Price-snapshotted line of an order. Never recomputed after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
}

impl OrderItem {
    pub fn line_total(&self) -> BigDecimal {
        &self.price * BigDecimal::from(self.quantity)
    }
}

/// Order row without its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHeader {
    pub id: i32,
    pub user_id: i32,
    pub status: OrderStatus,
    pub total_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i32,
    pub user_id: i32,
    pub status: OrderStatus,
    pub total_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn from_parts(header: OrderHeader, items: Vec<OrderItem>) -> Self {
        Self {
            id: header.id,
            user_id: header.user_id,
            status: header.status,
            total_amount: header.total_amount,
            created_at: header.created_at,
            items,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
