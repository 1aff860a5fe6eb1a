use crate::{
    entities::payment_transaction::{self, PaymentMethod},
    errors::ServiceError,
    handlers::CustomerId,
    services::payments::gateway::InitiatePaymentOpts,
    ApiResponse, AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/orders/:order_id/initiate", post(initiate_payment))
        .route("/transactions/:id", get(get_transaction))
        .route("/mpesa/callback", post(mpesa_callback))
        .route("/paypal/return", get(paypal_return))
        .route("/paypal/cancel", get(paypal_cancel))
}

#[derive(Debug, Deserialize)]
struct InitiatePaymentRequest {
    payment_method: String,
    phone_number: Option<String>,
    return_url: Option<String>,
    cancel_url: Option<String>,
}

async fn initiate_payment(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<payment_transaction::Model>>), ServiceError> {
    let method = PaymentMethod::parse(&payload.payment_method).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Unsupported payment method: {}",
            payload.payment_method
        ))
    })?;

    let transaction = state
        .services
        .payments
        .initiate_payment(
            customer_id,
            order_id,
            method,
            InitiatePaymentOpts {
                phone_number: payload.phone_number,
                return_url: payload.return_url,
                cancel_url: payload.cancel_url,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(transaction))))
}

/// Poll endpoint the waiting page uses while the STK prompt is open.
async fn get_transaction(
    State(state): State<AppState>,
    CustomerId(customer_id): CustomerId,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<payment_transaction::Model>>, ServiceError> {
    let transaction = state.services.payments.get_transaction(id).await?;
    if transaction.customer_id != customer_id {
        return Err(ServiceError::NotFound(format!(
            "Transaction {} not found",
            id
        )));
    }
    Ok(Json(ApiResponse::success(transaction)))
}

/// Daraja STK webhook. Always acknowledged with 200 regardless of the
/// reconciliation outcome; Daraja does not retry on error responses, so
/// failures are logged loudly instead of surfaced.
async fn mpesa_callback(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match state.services.payments.handle_mpesa_callback(payload).await {
        Ok(status) => {
            info!(?status, "Processed M-Pesa callback");
        }
        Err(e) => {
            error!(error = %e, "Failed to process M-Pesa callback");
        }
    }

    (
        StatusCode::OK,
        Json(json!({ "ResultCode": 0, "ResultDesc": "Accepted" })),
    )
}

#[derive(Debug, Deserialize)]
struct PayPalReturnQuery {
    #[serde(rename = "paymentId")]
    payment_id: String,
    #[serde(rename = "PayerID")]
    payer_id: String,
}

/// The payer approved the payment and was redirected back; execute the
/// sale and reconcile.
async fn paypal_return(
    State(state): State<AppState>,
    Query(query): Query<PayPalReturnQuery>,
) -> Result<Json<ApiResponse<Value>>, ServiceError> {
    let status = state
        .services
        .payments
        .execute_paypal_return(query.payment_id, query.payer_id)
        .await?;

    Ok(Json(ApiResponse::success(
        json!({ "reconciliation": format!("{:?}", status) }),
    )))
}

#[derive(Debug, Deserialize)]
struct PayPalCancelQuery {
    #[serde(rename = "paymentId")]
    payment_id: Option<String>,
}

/// The payer abandoned the approval flow. State is deliberately left
/// untouched; the expiry sweep reaps the attempt later.
async fn paypal_cancel(
    State(state): State<AppState>,
    Query(query): Query<PayPalCancelQuery>,
) -> Json<ApiResponse<Value>> {
    state
        .services
        .payments
        .cancel_paypal_return(query.payment_id)
        .await;

    Json(ApiResponse::success(json!({ "status": "cancelled" })))
}
