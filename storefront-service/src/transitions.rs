use std::sync::Arc;

use shared::*;
use tracing::{info, instrument, warn};

use crate::store::{finish, hydrate, OrderRepository, Store};

/// Applies status changes along the order transition table.
#[derive(Clone)]
pub struct OrderStateMachine<S> {
    store: S,
    gate: Arc<dyn AuthorizationGate>,
}

impl<S: Store> OrderStateMachine<S> {
    pub fn new(store: S, gate: Arc<dyn AuthorizationGate>) -> Self {
        Self { store, gate }
    }

    /// Moves an order to `target`.
    ///
    /// The order row is locked before its status is read, so two concurrent callers are
    /// serialized and the second one validates against the first one's result.
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        order_id: i32,
        target: OrderStatus,
        principal: Principal,
    ) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = self.transition_in(&mut tx, order_id, target, &principal).await;
        let order = finish(tx, result).await?;

        info!("Order {} moved to {} by user {}", order_id, target, principal.id);
        Ok(order)
    }

    async fn transition_in(
        &self,
        tx: &mut S::Tx,
        order_id: i32,
        target: OrderStatus,
        principal: &Principal,
    ) -> Result<Order, OrderError> {
        let mut header = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| OrderError::not_found(format!("order {}", order_id)))?;

        let resource = Resource::Order {
            owner_id: header.user_id,
        };
        if !self
            .gate
            .is_authorized(principal, Action::UpdateOrderStatus, &resource)
        {
            warn!("User {} may not change status of order {}", principal.id, order_id);
            return Err(OrderError::Forbidden);
        }

        let current = header.status;
        if !current.can_transition_to(target) {
            return Err(OrderError::InvalidTransition {
                from: current,
                to: target,
            });
        }

        if !tx.update_order_status(order_id, current, target).await? {
            return Err(OrderError::Conflict(order_id));
        }
        header.status = target;

        let mut orders = hydrate(tx, vec![header]).await?;
        orders
            .pop()
            .ok_or_else(|| OrderError::not_found(format!("order {}", order_id)))
    }
}
