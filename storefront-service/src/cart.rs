use shared::*;
use tracing::{info, instrument};

use crate::store::{finish, CartRepository, ProductCatalog, Store};

#[derive(Clone)]
pub struct CartService<S> {
    store: S,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Adds `quantity` of a product to the user's cart, creating the cart on first use.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: i32,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartItem, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = Self::add_item_in(&mut tx, user_id, product_id, quantity).await;
        finish(tx, result).await
    }

    async fn add_item_in(
        tx: &mut S::Tx,
        user_id: i32,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartItem, OrderError> {
        if quantity <= 0 {
            return Err(OrderError::InvalidArgument(format!(
                "quantity must be positive, got {}",
                quantity
            )));
        }

        let cart = tx.get_or_create_cart(user_id).await?;

        if tx.price_of(product_id).await?.is_none() {
            return Err(OrderError::not_found(format!("product {}", product_id)));
        }

        let already = tx
            .cart_items(cart.id)
            .await?
            .into_iter()
            .find(|item| item.product_id == product_id)
            .map(|item| item.quantity)
            .unwrap_or(0);
        if already.checked_add(quantity).is_none() {
            return Err(OrderError::InvalidArgument(format!(
                "quantity for product {} is too large",
                product_id
            )));
        }

        let item = tx.merge_cart_item(cart.id, product_id, quantity).await?;
        info!("Cart {} now holds {} x product {}", cart.id, item.quantity, product_id);
        Ok(item)
    }

    pub async fn view(&self, user_id: i32) -> Result<CartContents, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let cart = tx
                .find_cart(user_id)
                .await?
                .ok_or_else(|| OrderError::not_found("cart"))?;
            let items = tx.cart_items(cart.id).await?;
            Ok::<_, OrderError>(CartContents { id: cart.id, items })
        }
        .await;
        finish(tx, result).await
    }

    /// Empties the user's cart. The cart row itself is kept for reuse.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: i32) -> Result<usize, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            match tx.lock_cart(user_id).await? {
                Some(cart) => Ok::<_, OrderError>(tx.clear_cart(cart.id).await?),
                None => Ok(0),
            }
        }
        .await;
        let removed = finish(tx, result).await?;
        info!("Cleared {} items from cart of user {}", removed, user_id);
        Ok(removed)
    }
}
