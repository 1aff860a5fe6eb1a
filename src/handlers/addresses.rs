use crate::{
    entities::address,
    errors::ServiceError,
    handlers::CustomerId,
    services::checkout::CreateAddressInput,
    ApiResponse, AppState,
};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};

pub fn addresses_routes() -> Router<AppState> {
    Router::new().route("/", post(create_address).get(list_addresses))
}

async fn create_address(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Json(payload): Json<CreateAddressInput>,
) -> Result<(StatusCode, Json<ApiResponse<address::Model>>), ServiceError> {
    let created = state
        .services
        .checkout
        .create_address(customer_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

async fn list_addresses(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
) -> Result<Json<ApiResponse<Vec<address::Model>>>, ServiceError> {
    let addresses = state.services.checkout.list_addresses(customer_id).await?;
    Ok(Json(ApiResponse::success(addresses)))
}
