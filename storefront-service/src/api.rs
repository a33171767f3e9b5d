use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::*;
use thiserror::Error;
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{AuthError, AuthUser, TokenKeys};
use crate::cart::CartService;
use crate::orders::{OrderService, DEFAULT_PAGE_SIZE};
use crate::store::Store;
use crate::transitions::OrderStateMachine;

#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub tokens: Arc<TokenKeys>,
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
    pub transitions: OrderStateMachine<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, tokens: TokenKeys, gate: Arc<dyn AuthorizationGate>) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            orders: OrderService::new(store.clone(), gate.clone()),
            transitions: OrderStateMachine::new(store.clone(), gate),
            tokens: Arc::new(tokens),
            store,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct ClearCartResponse {
    pub removed: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Body(#[from] JsonRejection),
    #[error(transparent)]
    Path(#[from] PathRejection),
    #[error(transparent)]
    Query(#[from] QueryRejection),
}

/// `Json` body whose rejections render through [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Order(e) => match e {
                OrderError::EmptyCart | OrderError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                OrderError::Forbidden => StatusCode::FORBIDDEN,
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::ProductUnavailable(_)
                | OrderError::InvalidTransition { .. }
                | OrderError::Conflict(_) => StatusCode::CONFLICT,
                OrderError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Path(rejection) => rejection.status(),
            ApiError::Query(rejection) => rejection.status(),
        };

        let message = match &self {
            ApiError::Order(OrderError::Storage(e)) => {
                tracing::error!("Request failed: {:#}", e);
                "internal server error".to_string()
            }
            ApiError::Body(rejection) => rejection.body_text(),
            ApiError::Path(rejection) => rejection.body_text(),
            ApiError::Query(rejection) => rejection.body_text(),
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub fn create_router<S: Store>(state: AppState<S>, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route(
            "/cart",
            get(get_cart::<S>).post(add_to_cart::<S>).delete(clear_cart::<S>),
        )
        .route("/orders", get(list_orders::<S>).post(create_order::<S>))
        .route("/orders/:order_id", get(get_order::<S>))
        .route("/orders/:order_id/status", patch(update_order_status::<S>));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
}

pub async fn get_cart<S: Store>(
    State(state): State<AppState<S>>,
    AuthUser(principal): AuthUser,
) -> Result<Json<CartContents>, ApiError> {
    Ok(Json(state.carts.view(principal.id).await?))
}

pub async fn add_to_cart<S: Store>(
    State(state): State<AppState<S>>,
    AuthUser(principal): AuthUser,
    JsonBody(request): JsonBody<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    let item = state
        .carts
        .add_item(principal.id, request.product_id, request.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn clear_cart<S: Store>(
    State(state): State<AppState<S>>,
    AuthUser(principal): AuthUser,
) -> Result<Json<ClearCartResponse>, ApiError> {
    let removed = state.carts.clear(principal.id).await?;
    Ok(Json(ClearCartResponse { removed }))
}

pub async fn create_order<S: Store>(
    State(state): State<AppState<S>>,
    AuthUser(principal): AuthUser,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.orders.create_from_cart(principal.id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders<S: Store>(
    State(state): State<AppState<S>>,
    AuthUser(principal): AuthUser,
    QueryParams(params): QueryParams<ListOrdersParams>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state
        .orders
        .list_orders(
            principal.id,
            params.skip.unwrap_or(0),
            params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(orders))
}

pub async fn get_order<S: Store>(
    State(state): State<AppState<S>>,
    AuthUser(principal): AuthUser,
    PathParam(order_id): PathParam<i32>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.get_order(order_id, principal).await?))
}

pub async fn update_order_status<S: Store>(
    State(state): State<AppState<S>>,
    AuthUser(principal): AuthUser,
    PathParam(order_id): PathParam<i32>,
    JsonBody(request): JsonBody<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .transitions
        .transition(order_id, request.status, principal)
        .await?;
    Ok(Json(order))
}

pub async fn health_check() -> &'static str {
    "OK"
}
