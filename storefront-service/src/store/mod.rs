//! Persistence seam for the order core.
//!
//! A [`Store`] hands out [`StoreTx`] units of work. Everything read or written through
//! one `StoreTx` becomes visible atomically on [`StoreTx::commit`]; a rollback, or
//! simply dropping the transaction, discards it.

use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use shared::*;
use tracing::warn;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// Resolves a product id to its current price.
#[async_trait]
pub trait ProductCatalog {
    async fn price_of(&mut self, product_id: i32) -> Result<Option<BigDecimal>>;
}

#[async_trait]
pub trait CartRepository {
    /// Returns the user's cart, inserting it first if needed. The cart row stays locked
    /// until the transaction ends.
    async fn get_or_create_cart(&mut self, user_id: i32) -> Result<Cart>;

    /// Locks and returns the user's cart if one exists.
    async fn lock_cart(&mut self, user_id: i32) -> Result<Option<Cart>>;

    async fn find_cart(&mut self, user_id: i32) -> Result<Option<Cart>>;

    /// Lines of the cart in insertion order.
    async fn cart_items(&mut self, cart_id: i32) -> Result<Vec<CartItem>>;

    /// Inserts the line, or adds `quantity` to the existing line for the same product.
    async fn merge_cart_item(&mut self, cart_id: i32, product_id: i32, quantity: i32)
        -> Result<CartItem>;

    /// Removes every line of the cart and returns how many were removed.
    async fn clear_cart(&mut self, cart_id: i32) -> Result<usize>;
}

#[async_trait]
pub trait OrderRepository {
    async fn insert_order(&mut self, user_id: i32, created_at: DateTime<Utc>) -> Result<OrderHeader>;

    async fn insert_order_items(&mut self, order_id: i32, items: &[OrderItem]) -> Result<()>;

    async fn set_order_total(&mut self, order_id: i32, total: &BigDecimal) -> Result<()>;

    async fn find_order(&mut self, order_id: i32) -> Result<Option<OrderHeader>>;

    /// Like `find_order`, but the row stays locked until the transaction ends.
    async fn lock_order(&mut self, order_id: i32) -> Result<Option<OrderHeader>>;

    /// Writes `next` only if the stored status is still `expected`. Returns whether a
    /// row was updated.
    async fn update_order_status(
        &mut self,
        order_id: i32,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool>;

    async fn list_orders(&mut self, user_id: i32, offset: i64, limit: i64) -> Result<Vec<OrderHeader>>;

    /// Items of the given orders, grouped by order id, each group in insertion order.
    async fn order_items(&mut self, order_ids: &[i32]) -> Result<Vec<(i32, OrderItem)>>;
}

#[async_trait]
pub trait UserDirectory {
    async fn principal_by_email(&mut self, email: &str) -> Result<Option<Principal>>;
}

#[async_trait]
pub trait StoreTx:
    ProductCatalog + CartRepository + OrderRepository + UserDirectory + Send + Sized
{
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Commits on success and rolls back on failure, returning the original outcome.
pub async fn finish<T, R>(tx: T, result: Result<R, OrderError>) -> Result<R, OrderError>
where
    T: StoreTx,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback failed after {}: {:#}", e, rollback_err);
            }
            Err(e)
        }
    }
}

/// Loads the items for each header and assembles full orders in the same order.
pub async fn hydrate<T>(tx: &mut T, headers: Vec<OrderHeader>) -> Result<Vec<Order>>
where
    T: StoreTx,
{
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = headers.iter().map(|h| h.id).collect();
    let mut items = tx.order_items(&ids).await?;

    Ok(headers
        .into_iter()
        .map(|header| {
            let own: Vec<OrderItem> = items
                .iter()
                .filter(|(order_id, _)| *order_id == header.id)
                .map(|(_, item)| item.clone())
                .collect();
            items.retain(|(order_id, _)| *order_id != header.id);
            Order::from_parts(header, own)
        })
        .collect())
}
