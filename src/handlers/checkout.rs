use crate::{
    entities::order,
    errors::ServiceError,
    handlers::CustomerId,
    services::checkout::CheckoutInput,
    ApiResponse, AppState,
};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/", post(create_order))
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    shipping_address_id: Uuid,
    billing_address_id: Option<Uuid>,
    payment_method: Option<String>,
    notes: Option<String>,
}

/// Converts the customer's cart into an order. The cart itself is left
/// untouched until payment succeeds.
async fn create_order(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<order::Model>>), ServiceError> {
    let order = state
        .services
        .checkout
        .create_order_from_cart(
            customer_id,
            CheckoutInput {
                shipping_address_id: payload.shipping_address_id,
                billing_address_id: payload.billing_address_id,
                payment_method: payload.payment_method,
                notes: payload.notes,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}
