//! In-process store used by tests and local runs.
//!
//! One transaction at a time owns all tables: `begin` takes an exclusive lock and
//! stages writes on a private copy, which `commit` publishes. Dropping the
//! transaction releases the lock and throws the copy away.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_traits::Zero;
use shared::*;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::*;

#[derive(Debug, Clone)]
struct UserRow {
    email: String,
    role: Role,
}

#[derive(Debug, Clone)]
struct OrderItemRow {
    order_id: i32,
    item: OrderItem,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i32,
    users: BTreeMap<i32, UserRow>,
    products: BTreeMap<i32, BigDecimal>,
    carts: BTreeMap<i32, Cart>,
    cart_items: BTreeMap<i32, CartItem>,
    orders: BTreeMap<i32, OrderHeader>,
    order_items: BTreeMap<i32, OrderItemRow>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, email: &str, role: Role) -> i32 {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        tables.users.insert(
            id,
            UserRow {
                email: email.to_string(),
                role,
            },
        );
        id
    }

    pub async fn add_product(&self, price: BigDecimal) -> i32 {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        tables.products.insert(id, price);
        id
    }

    pub async fn set_price(&self, product_id: i32, price: BigDecimal) {
        self.tables.lock().await.products.insert(product_id, price);
    }

    /// Drops the product from the catalog but, unlike the Postgres schema, leaves
    /// cart lines pointing at it in place.
    pub async fn remove_product(&self, product_id: i32) {
        self.tables.lock().await.products.remove(&product_id);
    }

    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = Tables::clone(&guard);
        Ok(MemoryTx { guard, staged })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl ProductCatalog for MemoryTx {
    async fn price_of(&mut self, product_id: i32) -> Result<Option<BigDecimal>> {
        Ok(self.staged.products.get(&product_id).cloned())
    }
}

#[async_trait]
impl CartRepository for MemoryTx {
    async fn get_or_create_cart(&mut self, user_id: i32) -> Result<Cart> {
        if let Some(cart) = self.find_cart(user_id).await? {
            return Ok(cart);
        }
        let id = self.staged.next_id();
        let cart = Cart { id, user_id };
        self.staged.carts.insert(id, cart.clone());
        Ok(cart)
    }

    async fn lock_cart(&mut self, user_id: i32) -> Result<Option<Cart>> {
        self.find_cart(user_id).await
    }

    async fn find_cart(&mut self, user_id: i32) -> Result<Option<Cart>> {
        Ok(self
            .staged
            .carts
            .values()
            .find(|cart| cart.user_id == user_id)
            .cloned())
    }

    async fn cart_items(&mut self, cart_id: i32) -> Result<Vec<CartItem>> {
        Ok(self
            .staged
            .cart_items
            .values()
            .filter(|item| item.cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn merge_cart_item(
        &mut self,
        cart_id: i32,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartItem> {
        let existing = self
            .staged
            .cart_items
            .values_mut()
            .find(|item| item.cart_id == cart_id && item.product_id == product_id);

        if let Some(item) = existing {
            item.quantity = item
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| anyhow!("quantity overflow for product {}", product_id))?;
            return Ok(item.clone());
        }

        let id = self.staged.next_id();
        let item = CartItem {
            id,
            cart_id,
            product_id,
            quantity,
        };
        self.staged.cart_items.insert(id, item.clone());
        Ok(item)
    }

    async fn clear_cart(&mut self, cart_id: i32) -> Result<usize> {
        let before = self.staged.cart_items.len();
        self.staged.cart_items.retain(|_, item| item.cart_id != cart_id);
        Ok(before - self.staged.cart_items.len())
    }
}

#[async_trait]
impl OrderRepository for MemoryTx {
    async fn insert_order(&mut self, user_id: i32, created_at: DateTime<Utc>) -> Result<OrderHeader> {
        let id = self.staged.next_id();
        let header = OrderHeader {
            id,
            user_id,
            status: OrderStatus::Pending,
            total_amount: BigDecimal::zero(),
            created_at,
        };
        self.staged.orders.insert(id, header.clone());
        Ok(header)
    }

    async fn insert_order_items(&mut self, order_id: i32, items: &[OrderItem]) -> Result<()> {
        for item in items {
            let id = self.staged.next_id();
            self.staged.order_items.insert(
                id,
                OrderItemRow {
                    order_id,
                    item: item.clone(),
                },
            );
        }
        Ok(())
    }

    async fn set_order_total(&mut self, order_id: i32, total: &BigDecimal) -> Result<()> {
        let header = self
            .staged
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| anyhow!("order {} vanished", order_id))?;
        header.total_amount = total.clone();
        Ok(())
    }

    async fn find_order(&mut self, order_id: i32) -> Result<Option<OrderHeader>> {
        Ok(self.staged.orders.get(&order_id).cloned())
    }

    async fn lock_order(&mut self, order_id: i32) -> Result<Option<OrderHeader>> {
        self.find_order(order_id).await
    }

    async fn update_order_status(
        &mut self,
        order_id: i32,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        match self.staged.orders.get_mut(&order_id) {
            Some(header) if header.status == expected => {
                header.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_orders(&mut self, user_id: i32, offset: i64, limit: i64) -> Result<Vec<OrderHeader>> {
        Ok(self
            .staged
            .orders
            .values()
            .filter(|header| header.user_id == user_id)
            .skip(usize::try_from(offset)?)
            .take(usize::try_from(limit)?)
            .cloned()
            .collect())
    }

    async fn order_items(&mut self, order_ids: &[i32]) -> Result<Vec<(i32, OrderItem)>> {
        Ok(self
            .staged
            .order_items
            .values()
            .filter(|row| order_ids.contains(&row.order_id))
            .map(|row| (row.order_id, row.item.clone()))
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryTx {
    async fn principal_by_email(&mut self, email: &str) -> Result<Option<Principal>> {
        Ok(self
            .staged
            .users
            .iter()
            .find(|(_, user)| user.email == email)
            .map(|(id, user)| Principal::new(*id, user.role)))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self) -> Result<()> {
        let MemoryTx { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
