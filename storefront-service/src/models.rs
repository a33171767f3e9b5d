use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::*;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::carts)]
pub struct DbCart {
    pub id: i32,
    pub user_id: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct DbCartItem {
    pub id: i32,
    pub cart_id: i32,
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct NewCartItem {
    pub cart_id: i32,
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::orders)]
pub struct DbOrder {
    pub id: i32,
    pub user_id: i32,
    pub status: String,
    pub total_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub user_id: i32,
    pub status: String,
    pub total_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::order_items)]
pub struct DbOrderItem {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::order_items)]
pub struct NewOrderItem {
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
}

impl From<DbCart> for Cart {
    fn from(row: DbCart) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
        }
    }
}

impl From<DbCartItem> for CartItem {
    fn from(row: DbCartItem) -> Self {
        Self {
            id: row.id,
            cart_id: row.cart_id,
            product_id: row.product_id,
            quantity: row.quantity,
        }
    }
}

impl TryFrom<DbOrder> for OrderHeader {
    type Error = anyhow::Error;

    fn try_from(row: DbOrder) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            status: row.status.parse()?,
            total_amount: row.total_amount,
            created_at: row.created_at,
        })
    }
}

impl From<DbOrderItem> for OrderItem {
    fn from(row: DbOrderItem) -> Self {
        Self {
            product_id: row.product_id,
            quantity: row.quantity,
            price: row.price,
        }
    }
}

impl NewOrderItem {
    pub fn snapshot_of(order_id: i32, item: &OrderItem) -> Self {
        Self {
            order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price.clone(),
        }
    }
}
