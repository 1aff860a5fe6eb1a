use crate::{
    entities::cart_item,
    errors::ServiceError,
    handlers::CustomerId,
    services::cart::{AddToCartInput, CartWithItems},
    ApiResponse, AppState,
};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_to_cart))
        .route("/items/:item_id", put(update_cart_item).delete(remove_cart_item))
}

/// Current cart contents with resolved prices and total.
async fn get_cart(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
) -> Result<Json<ApiResponse<CartWithItems>>, ServiceError> {
    let cart = state.services.cart.get_or_create_cart(customer_id).await?;
    let view = state.services.cart.get_cart_with_items(cart.id).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[derive(Debug, Deserialize)]
struct AddItemRequest {
    product_id: Uuid,
    quantity: i32,
    size: Option<String>,
    color: Option<String>,
}

async fn add_to_cart(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Json(payload): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<cart_item::Model>>), ServiceError> {
    let item = state
        .services
        .cart
        .add_item(
            customer_id,
            AddToCartInput {
                product_id: payload.product_id,
                quantity: payload.quantity,
                size: payload.size,
                color: payload.color,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(item))))
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    quantity: i32,
}

async fn update_cart_item(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<Json<ApiResponse<cart_item::Model>>, ServiceError> {
    let cart = state.services.cart.get_or_create_cart(customer_id).await?;
    let item = state
        .services
        .cart
        .update_item_quantity(cart.id, item_id, payload.quantity)
        .await?;

    Ok(Json(ApiResponse::success(item)))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    let cart = state.services.cart.get_or_create_cart(customer_id).await?;
    state.services.cart.remove_item(cart.id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
