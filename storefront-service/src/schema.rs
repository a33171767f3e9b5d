diesel::table! {
    users (id) {
        id -> Int4,
        email -> Varchar,
        username -> Varchar,
        hashed_password -> Varchar,
        is_active -> Bool,
        is_verified -> Bool,
        role -> Varchar,
        created_at -> Timestamptz,
        verification_expires -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    categories (id) {
        id -> Int4,
        name -> Varchar,
        description -> Nullable<Varchar>,
    }
}

diesel::table! {
    products (id) {
        id -> Int4,
        name -> Varchar,
        description -> Nullable<Varchar>,
        price -> Numeric,
        image_url -> Nullable<Varchar>,
        category_id -> Int4,
    }
}

diesel::table! {
    carts (id) {
        id -> Int4,
        user_id -> Int4,
    }
}

diesel::table! {
    cart_items (id) {
        id -> Int4,
        cart_id -> Int4,
        product_id -> Int4,
        quantity -> Int4,
    }
}

diesel::table! {
    orders (id) {
        id -> Int4,
        user_id -> Int4,
        status -> Varchar,
        total_amount -> Numeric,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    order_items (id) {
        id -> Int4,
        order_id -> Int4,
        product_id -> Int4,
        quantity -> Int4,
        price -> Numeric,
    }
}

diesel::joinable!(products -> categories (category_id));
diesel::joinable!(carts -> users (user_id));
diesel::joinable!(cart_items -> carts (cart_id));
diesel::joinable!(cart_items -> products (product_id));
diesel::joinable!(orders -> users (user_id));
diesel::joinable!(order_items -> orders (order_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    categories,
    products,
    carts,
    cart_items,
    orders,
    order_items,
);
