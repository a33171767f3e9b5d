use std::sync::Arc;

use chrono::Utc;
use shared::pricing::{fits_money_column, order_total, snapshot};
use shared::*;
use tracing::{info, instrument};

use crate::store::{finish, hydrate, CartRepository, OrderRepository, ProductCatalog, Store};

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Turns carts into orders and serves order reads.
#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
    gate: Arc<dyn AuthorizationGate>,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S, gate: Arc<dyn AuthorizationGate>) -> Self {
        Self { store, gate }
    }

    /// Converts the user's cart into a pending order in one transaction.
    ///
    /// The cart row is locked for the whole conversion, so a concurrent checkout of the
    /// same cart waits and then finds it empty. Any failure leaves the cart untouched
    /// and persists no order.
    #[instrument(skip(self))]
    pub async fn create_from_cart(&self, user_id: i32) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = Self::create_in(&mut tx, user_id).await;
        let order = finish(tx, result).await?;

        info!(
            "Created order {} for user {} with {} items, total {}",
            order.id,
            user_id,
            order.items.len(),
            order.total_amount
        );
        Ok(order)
    }

    async fn create_in(tx: &mut S::Tx, user_id: i32) -> Result<Order, OrderError> {
        let cart = tx.lock_cart(user_id).await?.ok_or(OrderError::EmptyCart)?;
        let lines = tx.cart_items(cart.id).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut header = tx.insert_order(user_id, Utc::now()).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let price = tx
                .price_of(line.product_id)
                .await?
                .ok_or(OrderError::ProductUnavailable(line.product_id))?;
            items.push(snapshot(line, price));
        }
        let total = order_total(&items);
        if !fits_money_column(&total) {
            return Err(OrderError::InvalidArgument(format!(
                "order total {} is too large",
                total
            )));
        }

        tx.insert_order_items(header.id, &items).await?;
        tx.set_order_total(header.id, &total).await?;
        tx.clear_cart(cart.id).await?;

        header.total_amount = total;
        Ok(Order::from_parts(header, items))
    }

    pub async fn list_orders(
        &self,
        user_id: i32,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Order>, OrderError> {
        if offset < 0 || limit < 0 {
            return Err(OrderError::InvalidArgument(
                "skip and limit must not be negative".to_string(),
            ));
        }
        let limit = limit.min(MAX_PAGE_SIZE);

        let mut tx = self.store.begin().await?;
        let result = async {
            let headers = tx.list_orders(user_id, offset, limit).await?;
            Ok::<_, OrderError>(hydrate(&mut tx, headers).await?)
        }
        .await;
        finish(tx, result).await
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: i32, principal: Principal) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let header = tx
                .find_order(order_id)
                .await?
                .ok_or_else(|| OrderError::not_found(format!("order {}", order_id)))?;

            let resource = Resource::Order {
                owner_id: header.user_id,
            };
            if !self.gate.is_authorized(&principal, Action::ReadOrder, &resource) {
                return Err(OrderError::Forbidden);
            }

            let mut orders = hydrate(&mut tx, vec![header]).await?;
            orders
                .pop()
                .ok_or_else(|| OrderError::not_found(format!("order {}", order_id)))
        }
        .await;
        finish(tx, result).await
    }
}
