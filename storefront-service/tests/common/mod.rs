#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use shared::{AuthorizationGate, Principal, Role, RolePolicy};
use storefront_service::cart::CartService;
use storefront_service::orders::OrderService;
use storefront_service::store::MemoryStore;
use storefront_service::transitions::OrderStateMachine;

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

/// Services wired to one in-memory store, with a customer, an admin and two products.
pub struct Shop {
    pub store: MemoryStore,
    pub carts: CartService<MemoryStore>,
    pub orders: OrderService<MemoryStore>,
    pub transitions: OrderStateMachine<MemoryStore>,
    pub customer: Principal,
    pub admin: Principal,
    pub coffee: i32,
    pub croissant: i32,
}

impl Shop {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let gate: Arc<dyn AuthorizationGate> = Arc::new(RolePolicy);

        let customer = store.add_user("customer@example.com", Role::User).await;
        let admin = store.add_user("admin@example.com", Role::Admin).await;
        let coffee = store.add_product(dec("5.00")).await;
        let croissant = store.add_product(dec("3.25")).await;

        Self {
            carts: CartService::new(store.clone()),
            orders: OrderService::new(store.clone(), gate.clone()),
            transitions: OrderStateMachine::new(store.clone(), gate),
            store,
            customer: Principal::new(customer, Role::User),
            admin: Principal::new(admin, Role::Admin),
            coffee,
            croissant,
        }
    }

    pub async fn another_customer(&self, email: &str) -> Principal {
        Principal::new(self.store.add_user(email, Role::User).await, Role::User)
    }

    /// Puts one coffee in the customer's cart and checks it out.
    pub async fn placed_order(&self) -> i32 {
        self.carts
            .add_item(self.customer.id, self.coffee, 1)
            .await
            .unwrap();
        self.orders
            .create_from_cart(self.customer.id)
            .await
            .unwrap()
            .id
    }
}
