pub mod api;
pub mod auth;
pub mod cart;
pub mod models;
pub mod orders;
pub mod schema;
pub mod store;
pub mod transitions;
