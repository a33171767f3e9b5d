use thiserror::Error;

use crate::OrderStatus;

/// Failures surfaced by the order core.
///
/// Every variant except `Storage` is a business-rule outcome the caller maps to a
/// client error. `Storage` carries infrastructure failures through untouched.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("product {0} is unavailable")]
    ProductUnavailable(i32),

    #[error("{0} not found")]
    NotFound(String),

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("not allowed")]
    Forbidden,

    #[error("order {0} was changed by another request")]
    Conflict(i32),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl OrderError {
    pub fn not_found(what: impl Into<String>) -> Self {
        OrderError::NotFound(what.into())
    }

    pub fn is_business(&self) -> bool {
        !matches!(self, OrderError::Storage(_))
    }
}
