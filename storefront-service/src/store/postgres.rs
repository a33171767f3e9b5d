use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use num_traits::Zero;
use shared::*;

use super::*;
use crate::models::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    lock_timeout_ms: u64,
}

impl PgStore {
    pub fn new(pool: DbPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let mut conn = self.pool.get_owned().await?;
        AnsiTransactionManager::begin_transaction(&mut *conn).await?;

        let mut tx = PgTx { conn };
        diesel::sql_query(format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms))
            .execute(tx.conn())
            .await?;
        Ok(tx)
    }
}

/// Open transaction on a pooled connection.
///
/// If a `PgTx` is dropped before `commit`, the pool sees a connection still inside a
/// transaction, treats it as broken and closes it, so the server rolls the work back.
pub struct PgTx {
    conn: PooledConnection<'static, AsyncPgConnection>,
}

impl PgTx {
    fn conn(&mut self) -> &mut AsyncPgConnection {
        &mut self.conn
    }
}

#[async_trait]
impl ProductCatalog for PgTx {
    async fn price_of(&mut self, product_id: i32) -> Result<Option<BigDecimal>> {
        let price = products::table
            .find(product_id)
            .select(products::price)
            .first::<BigDecimal>(self.conn())
            .await
            .optional()?;
        Ok(price)
    }
}

#[async_trait]
impl CartRepository for PgTx {
    async fn get_or_create_cart(&mut self, user_id: i32) -> Result<Cart> {
        diesel::insert_into(carts::table)
            .values(carts::user_id.eq(user_id))
            .on_conflict(carts::user_id)
            .do_nothing()
            .execute(self.conn())
            .await?;

        self.lock_cart(user_id)
            .await?
            .ok_or_else(|| anyhow!("cart for user {} vanished after insert", user_id))
    }

    async fn lock_cart(&mut self, user_id: i32) -> Result<Option<Cart>> {
        let cart = carts::table
            .filter(carts::user_id.eq(user_id))
            .for_update()
            .first::<DbCart>(self.conn())
            .await
            .optional()?;
        Ok(cart.map(Cart::from))
    }

    async fn find_cart(&mut self, user_id: i32) -> Result<Option<Cart>> {
        let cart = carts::table
            .filter(carts::user_id.eq(user_id))
            .first::<DbCart>(self.conn())
            .await
            .optional()?;
        Ok(cart.map(Cart::from))
    }

    async fn cart_items(&mut self, cart_id: i32) -> Result<Vec<CartItem>> {
        let rows = cart_items::table
            .filter(cart_items::cart_id.eq(cart_id))
            .order(cart_items::id.asc())
            .load::<DbCartItem>(self.conn())
            .await?;
        Ok(rows.into_iter().map(CartItem::from).collect())
    }

    async fn merge_cart_item(
        &mut self,
        cart_id: i32,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartItem> {
        let new_item = NewCartItem {
            cart_id,
            product_id,
            quantity,
        };

        let row = diesel::insert_into(cart_items::table)
            .values(&new_item)
            .on_conflict((cart_items::cart_id, cart_items::product_id))
            .do_update()
            .set(cart_items::quantity.eq(cart_items::quantity + quantity))
            .get_result::<DbCartItem>(self.conn())
            .await?;
        Ok(row.into())
    }

    async fn clear_cart(&mut self, cart_id: i32) -> Result<usize> {
        let removed = diesel::delete(cart_items::table.filter(cart_items::cart_id.eq(cart_id)))
            .execute(self.conn())
            .await?;
        Ok(removed)
    }
}

#[async_trait]
impl OrderRepository for PgTx {
    async fn insert_order(&mut self, user_id: i32, created_at: DateTime<Utc>) -> Result<OrderHeader> {
        let new_order = NewOrder {
            user_id,
            status: OrderStatus::Pending.as_str().to_string(),
            total_amount: BigDecimal::zero(),
            created_at,
        };

        let row = diesel::insert_into(orders::table)
            .values(&new_order)
            .get_result::<DbOrder>(self.conn())
            .await?;
        OrderHeader::try_from(row)
    }

    async fn insert_order_items(&mut self, order_id: i32, items: &[OrderItem]) -> Result<()> {
        let rows: Vec<NewOrderItem> = items
            .iter()
            .map(|item| NewOrderItem::snapshot_of(order_id, item))
            .collect();

        diesel::insert_into(order_items::table)
            .values(&rows)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    async fn set_order_total(&mut self, order_id: i32, total: &BigDecimal) -> Result<()> {
        diesel::update(orders::table.find(order_id))
            .set(orders::total_amount.eq(total.clone()))
            .execute(self.conn())
            .await?;
        Ok(())
    }

    async fn find_order(&mut self, order_id: i32) -> Result<Option<OrderHeader>> {
        let row = orders::table
            .find(order_id)
            .first::<DbOrder>(self.conn())
            .await
            .optional()?;
        row.map(OrderHeader::try_from).transpose()
    }

    async fn lock_order(&mut self, order_id: i32) -> Result<Option<OrderHeader>> {
        let row = orders::table
            .find(order_id)
            .for_update()
            .first::<DbOrder>(self.conn())
            .await
            .optional()?;
        row.map(OrderHeader::try_from).transpose()
    }

    async fn update_order_status(
        &mut self,
        order_id: i32,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        let updated = diesel::update(
            orders::table
                .filter(orders::id.eq(order_id))
                .filter(orders::status.eq(expected.as_str())),
        )
        .set(orders::status.eq(next.as_str()))
        .execute(self.conn())
        .await?;
        Ok(updated == 1)
    }

    async fn list_orders(&mut self, user_id: i32, offset: i64, limit: i64) -> Result<Vec<OrderHeader>> {
        let rows = orders::table
            .filter(orders::user_id.eq(user_id))
            .order(orders::id.asc())
            .offset(offset)
            .limit(limit)
            .load::<DbOrder>(self.conn())
            .await?;
        rows.into_iter().map(OrderHeader::try_from).collect()
    }

    async fn order_items(&mut self, order_ids: &[i32]) -> Result<Vec<(i32, OrderItem)>> {
        let rows = order_items::table
            .filter(order_items::order_id.eq_any(order_ids.to_vec()))
            .order((order_items::order_id.asc(), order_items::id.asc()))
            .load::<DbOrderItem>(self.conn())
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.order_id, OrderItem::from(row)))
            .collect())
    }
}

#[async_trait]
impl UserDirectory for PgTx {
    async fn principal_by_email(&mut self, email: &str) -> Result<Option<Principal>> {
        let row = users::table
            .filter(users::email.eq(email))
            .select((users::id, users::role))
            .first::<(i32, String)>(self.conn())
            .await
            .optional()?;

        match row {
            Some((id, role)) => Ok(Some(Principal::new(id, role.parse()?))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(mut self) -> Result<()> {
        AnsiTransactionManager::commit_transaction(self.conn()).await?;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        AnsiTransactionManager::rollback_transaction(self.conn()).await?;
        Ok(())
    }
}
