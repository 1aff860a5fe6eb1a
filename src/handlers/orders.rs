use crate::{
    entities::{order, order_item},
    errors::ServiceError,
    handlers::CustomerId,
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/by-number/:order_number", get(get_order_by_number))
        .route("/:id/items", get(get_order_items))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/status", put(update_order_status))
}

async fn list_orders(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<order::Model>>>, ServiceError> {
    let (items, total) = state
        .services
        .orders
        .list_orders_for_customer(customer_id, query.page, query.limit)
        .await?;

    let total_pages = total.div_ceil(query.limit.max(1));
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: query.page,
        limit: query.limit,
        total_pages,
    })))
}

async fn get_order(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    if order.customer_id != customer_id {
        return Err(ServiceError::NotFound(format!("Order {} not found", id)));
    }
    Ok(Json(ApiResponse::success(order)))
}

async fn get_order_by_number(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_by_number(&order_number)
        .await?;
    if order.customer_id != customer_id {
        return Err(ServiceError::NotFound(format!(
            "Order {} not found",
            order_number
        )));
    }
    Ok(Json(ApiResponse::success(order)))
}

async fn get_order_items(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<order_item::Model>>>, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    if order.customer_id != customer_id {
        return Err(ServiceError::NotFound(format!("Order {} not found", id)));
    }
    let items = state.services.orders.get_order_items(id).await?;
    Ok(Json(ApiResponse::success(items)))
}

async fn cancel_order(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    if order.customer_id != customer_id {
        return Err(ServiceError::NotFound(format!("Order {} not found", id)));
    }
    let cancelled = state.services.orders.cancel_order(id).await?;
    Ok(Json(ApiResponse::success(cancelled)))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: order::OrderStatus,
}

/// Order-management transition (fulfilment side). Auth for staff users
/// is handled upstream.
async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let updated = state.services.orders.update_status(id, payload.status).await?;
    Ok(Json(ApiResponse::success(updated)))
}
