use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::{CartItem, OrderItem};

/// Freezes a cart line at the catalog price observed right now.
pub fn snapshot(item: &CartItem, price: BigDecimal) -> OrderItem {
    OrderItem {
        product_id: item.product_id,
        quantity: item.quantity,
        price,
    }
}

/// Exclusive upper bound of a `NUMERIC(12,2)` money column.
const MONEY_LIMIT: i64 = 10_000_000_000;

/// Whether `amount` fits in a stored money column.
pub fn fits_money_column(amount: &BigDecimal) -> bool {
    *amount < BigDecimal::from(MONEY_LIMIT)
}

/// `Σ price * quantity` over the snapshotted lines.
pub fn order_total(items: &[OrderItem]) -> BigDecimal {
    items
        .iter()
        .fold(BigDecimal::zero(), |total, item| total + item.line_total())
}
