mod common;

use common::{dec, Shop};
use shared::{OrderError, OrderStatus};

#[tokio::test]
async fn checkout_totals_the_cart_and_empties_it() {
    let shop = Shop::new().await;
    let user = shop.customer.id;

    shop.carts.add_item(user, shop.coffee, 2).await.unwrap();
    shop.carts.add_item(user, shop.croissant, 3).await.unwrap();

    let order = shop.orders.create_from_cart(user).await.unwrap();

    assert_eq!(order.user_id, user);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, dec("19.75"));
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].product_id, shop.coffee);
    assert_eq!(order.items[0].price, dec("5.00"));
    assert_eq!(order.items[1].product_id, shop.croissant);
    assert_eq!(order.items[1].quantity, 3);

    let cart = shop.carts.view(user).await.unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn empty_cart_creates_no_order() {
    let shop = Shop::new().await;

    let err = shop.orders.create_from_cart(shop.customer.id).await.unwrap_err();
    assert!(matches!(err, OrderError::EmptyCart));

    shop.carts.add_item(shop.customer.id, shop.coffee, 1).await.unwrap();
    shop.carts.clear(shop.customer.id).await.unwrap();

    let err = shop.orders.create_from_cart(shop.customer.id).await.unwrap_err();
    assert!(matches!(err, OrderError::EmptyCart));
    assert_eq!(shop.store.order_count().await, 0);
}

#[tokio::test]
async fn cart_is_reused_after_checkout() {
    let shop = Shop::new().await;
    let user = shop.customer.id;

    shop.carts.add_item(user, shop.coffee, 1).await.unwrap();
    let before = shop.carts.view(user).await.unwrap().id;
    shop.orders.create_from_cart(user).await.unwrap();

    shop.carts.add_item(user, shop.croissant, 1).await.unwrap();
    let after = shop.carts.view(user).await.unwrap();

    assert_eq!(after.id, before);
    assert_eq!(after.items.len(), 1);
}

#[tokio::test]
async fn concurrent_checkouts_produce_exactly_one_order() {
    let shop = Shop::new().await;
    let user = shop.customer.id;
    shop.carts.add_item(user, shop.coffee, 1).await.unwrap();

    let first = tokio::spawn({
        let orders = shop.orders.clone();
        async move { orders.create_from_cart(user).await }
    });
    let second = tokio::spawn({
        let orders = shop.orders.clone();
        async move { orders.create_from_cart(user).await }
    });

    let results = vec![first.await.unwrap(), second.await.unwrap()];
    let created = results.iter().filter(|r| r.is_ok()).count();
    let empty = results
        .iter()
        .filter(|r| matches!(r, Err(OrderError::EmptyCart)))
        .count();

    assert_eq!(created, 1);
    assert_eq!(empty, 1);
    assert_eq!(shop.store.order_count().await, 1);
}

#[tokio::test]
async fn missing_product_aborts_checkout_and_keeps_the_cart() {
    let shop = Shop::new().await;
    let user = shop.customer.id;

    shop.carts.add_item(user, shop.coffee, 2).await.unwrap();
    shop.carts.add_item(user, shop.croissant, 1).await.unwrap();
    shop.store.remove_product(shop.croissant).await;

    let err = shop.orders.create_from_cart(user).await.unwrap_err();
    assert!(matches!(err, OrderError::ProductUnavailable(id) if id == shop.croissant));

    assert_eq!(shop.store.order_count().await, 0);
    let cart = shop.carts.view(user).await.unwrap();
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.items[0].quantity, 2);
}

#[tokio::test]
async fn order_keeps_the_price_it_was_placed_at() {
    let shop = Shop::new().await;
    let order_id = shop.placed_order().await;

    shop.store.set_price(shop.coffee, dec("8.00")).await;

    let order = shop.orders.get_order(order_id, shop.customer).await.unwrap();
    assert_eq!(order.items[0].price, dec("5.00"));
    assert_eq!(order.total_amount, dec("5.00"));
}

#[tokio::test]
async fn repeated_add_merges_into_one_line() {
    let shop = Shop::new().await;
    let user = shop.customer.id;

    shop.carts.add_item(user, shop.coffee, 1).await.unwrap();
    let item = shop.carts.add_item(user, shop.coffee, 2).await.unwrap();

    assert_eq!(item.quantity, 3);
    assert_eq!(shop.carts.view(user).await.unwrap().items.len(), 1);
}

#[tokio::test]
async fn add_item_rejects_bad_quantity_and_unknown_product() {
    let shop = Shop::new().await;
    let user = shop.customer.id;

    let err = shop.carts.add_item(user, shop.coffee, 0).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidArgument(_)));

    let err = shop.carts.add_item(user, 4242, 1).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));

    shop.carts.add_item(user, shop.coffee, i32::MAX).await.unwrap();
    let err = shop.carts.add_item(user, shop.coffee, 1).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidArgument(_)));
}

#[tokio::test]
async fn checkout_rejects_a_total_too_large_to_store() {
    let shop = Shop::new().await;
    let user = shop.customer.id;
    shop.carts.add_item(user, shop.coffee, i32::MAX).await.unwrap();

    let err = shop.orders.create_from_cart(user).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidArgument(_)));

    assert_eq!(shop.store.order_count().await, 0);
    let cart = shop.carts.view(user).await.unwrap();
    assert_eq!(cart.items[0].quantity, i32::MAX);
}

#[tokio::test]
async fn viewing_a_cart_that_was_never_created_is_not_found() {
    let shop = Shop::new().await;
    let err = shop.carts.view(shop.customer.id).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
}

#[tokio::test]
async fn status_walks_the_happy_path() {
    let shop = Shop::new().await;
    let order_id = shop.placed_order().await;

    for next in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed,
    ] {
        let order = shop
            .transitions
            .transition(order_id, next, shop.admin)
            .await
            .unwrap();
        assert_eq!(order.status, next);
    }
}

#[tokio::test]
async fn confirmed_order_cannot_jump_to_completed() {
    let shop = Shop::new().await;
    let order_id = shop.placed_order().await;

    shop.transitions
        .transition(order_id, OrderStatus::Confirmed, shop.admin)
        .await
        .unwrap();
    let err = shop
        .transitions
        .transition(order_id, OrderStatus::Completed, shop.admin)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::InvalidTransition {
            from: OrderStatus::Confirmed,
            to: OrderStatus::Completed
        }
    ));
}

#[tokio::test]
async fn customers_cannot_change_status_even_for_valid_moves() {
    let shop = Shop::new().await;
    let order_id = shop.placed_order().await;

    let err = shop
        .transitions
        .transition(order_id, OrderStatus::Confirmed, shop.customer)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Forbidden));

    let order = shop.orders.get_order(order_id, shop.customer).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn terminal_orders_stay_put() {
    let shop = Shop::new().await;
    let cancelled = shop.placed_order().await;
    shop.transitions
        .transition(cancelled, OrderStatus::Cancelled, shop.admin)
        .await
        .unwrap();

    for target in OrderStatus::ALL {
        let err = shop
            .transitions
            .transition(cancelled, target, shop.admin)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }
}

#[tokio::test]
async fn transition_on_missing_order_is_not_found() {
    let shop = Shop::new().await;
    let err = shop
        .transitions
        .transition(999, OrderStatus::Confirmed, shop.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_identical_transitions_apply_once() {
    let shop = Shop::new().await;
    let order_id = shop.placed_order().await;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let transitions = shop.transitions.clone();
            let admin = shop.admin;
            tokio::spawn(async move {
                transitions
                    .transition(order_id, OrderStatus::Confirmed, admin)
                    .await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(OrderError::InvalidTransition { .. }))));
}

#[tokio::test]
async fn orders_are_private_to_their_owner_and_admins() {
    let shop = Shop::new().await;
    let order_id = shop.placed_order().await;
    let stranger = shop.another_customer("stranger@example.com").await;

    let err = shop.orders.get_order(order_id, stranger).await.unwrap_err();
    assert!(matches!(err, OrderError::Forbidden));

    assert!(shop.orders.get_order(order_id, shop.admin).await.is_ok());

    let err = shop.orders.get_order(777, shop.customer).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
}

#[tokio::test]
async fn list_orders_pages_through_the_callers_orders() {
    let shop = Shop::new().await;
    let first = shop.placed_order().await;
    let second = shop.placed_order().await;
    let third = shop.placed_order().await;

    let stranger = shop.another_customer("stranger@example.com").await;
    assert!(shop.orders.list_orders(stranger.id, 0, 100).await.unwrap().is_empty());

    let all = shop.orders.list_orders(shop.customer.id, 0, 100).await.unwrap();
    let ids: Vec<i32> = all.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![first, second, third]);
    assert!(all.iter().all(|o| o.items.len() == 1));

    let page = shop.orders.list_orders(shop.customer.id, 1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, second);

    let err = shop
        .orders
        .list_orders(shop.customer.id, -1, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidArgument(_)));
}
