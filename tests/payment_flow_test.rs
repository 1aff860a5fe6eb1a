mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestApp;
use duka_api::{
    config::{CurrencyConfig, MpesaConfig, PayPalConfig},
    entities::{
        order::{self, PaymentStatus},
        payment_transaction::{self, PaymentMethod, TransactionStatus},
        Order, PaymentTransaction,
    },
    errors::ServiceError,
    services::{
        cart::AddToCartInput,
        checkout::CheckoutInput,
        payments::{gateway::InitiatePaymentOpts, ReconcileStatus},
    },
};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct PaymentHarness {
    app: TestApp,
    mpesa: MockServer,
    paypal: MockServer,
    _rates: MockServer,
}

async fn payment_harness() -> PaymentHarness {
    let mpesa = MockServer::start().await;
    let paypal = MockServer::start().await;
    let rates = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "mpesa-test-token",
            "expires_in": "3599"
        })))
        .mount(&mpesa)
        .await;

    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_TEST_1",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })))
        .mount(&mpesa)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "paypal-test-token",
            "token_type": "Bearer",
            "expires_in": 32400
        })))
        .mount(&paypal)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/payments/payment"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "PAY-TEST-1",
            "state": "created",
            "links": [
                {"href": "https://api.sandbox.paypal.com/v1/payments/payment/PAY-TEST-1", "rel": "self", "method": "GET"},
                {"href": "https://www.sandbox.paypal.com/checkoutnow?token=EC-TEST", "rel": "approval_url", "method": "REDIRECT"},
                {"href": "https://api.sandbox.paypal.com/v1/payments/payment/PAY-TEST-1/execute", "rel": "execute", "method": "POST"}
            ]
        })))
        .mount(&paypal)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/payments/payment/PAY-TEST-1/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "PAY-TEST-1",
            "state": "approved",
            "transactions": [
                {"related_resources": [{"sale": {"id": "SALE-TEST-9", "state": "completed"}}]}
            ]
        })))
        .mount(&paypal)
        .await;

    Mock::given(method("GET"))
        .and(path("/v4/latest/KES"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base": "KES",
            "rates": { "USD": 0.0077 }
        })))
        .mount(&rates)
        .await;

    let mut cfg = TestApp::base_config();
    cfg.mpesa = Some(MpesaConfig {
        base_url: mpesa.uri(),
        consumer_key: "test-consumer-key".to_string(),
        consumer_secret: "test-consumer-secret".to_string(),
        shortcode: "174379".to_string(),
        passkey: "test-passkey".to_string(),
    });
    cfg.paypal = Some(PayPalConfig {
        base_url: paypal.uri(),
        client_id: "test-client-id".to_string(),
        client_secret: "test-client-secret".to_string(),
    });
    cfg.currency = CurrencyConfig {
        rates_url: format!("{}/v4/latest/KES", rates.uri()),
        cache_ttl_secs: 3600,
    };

    PaymentHarness {
        app: TestApp::with_config(cfg).await,
        mpesa,
        paypal,
        _rates: rates,
    }
}

/// Seeds a product, fills the cart and checks out; returns the order.
async fn place_order(app: &TestApp, customer: Uuid) -> order::Model {
    let product = app.seed_product("Speaker", dec!(500), dec!(0), 10).await;
    let address = app.seed_address(customer).await;

    app.state
        .services
        .cart
        .add_item(
            customer,
            AddToCartInput {
                product_id: product.id,
                quantity: 2,
                size: None,
                color: None,
            },
        )
        .await
        .unwrap();

    app.state
        .services
        .checkout
        .create_order_from_cart(
            customer,
            CheckoutInput {
                shipping_address_id: address.id,
                billing_address_id: None,
                payment_method: None,
                notes: None,
            },
        )
        .await
        .unwrap()
}

fn mpesa_callback(checkout_request_id: &str, result_code: i64, receipt: Option<&str>) -> serde_json::Value {
    if result_code == 0 {
        json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": checkout_request_id,
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            {"Name": "Amount", "Value": 1160.00},
                            {"Name": "MpesaReceiptNumber", "Value": receipt.unwrap_or("ABC123")},
                            {"Name": "TransactionDate", "Value": 20260207103045u64},
                            {"Name": "PhoneNumber", "Value": 254712345678u64}
                        ]
                    }
                }
            }
        })
    } else {
        json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": checkout_request_id,
                    "ResultCode": result_code,
                    "ResultDesc": "Request cancelled by user"
                }
            }
        })
    }
}

#[tokio::test]
async fn mpesa_happy_path_reconciles_to_paid() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;
    assert_eq!(order.total, dec!(1160.00));

    let transaction = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::Mpesa,
            InitiatePaymentOpts {
                phone_number: Some("0712345678".to_string()),
                return_url: None,
                cancel_url: None,
            },
        )
        .await
        .expect("initiate mpesa payment");

    assert_eq!(transaction.status, TransactionStatus::Pending);
    assert_eq!(transaction.payment_method, PaymentMethod::Mpesa);
    assert_eq!(transaction.amount, dec!(1160.00));
    assert_eq!(transaction.provider_ref.as_deref(), Some("ws_CO_TEST_1"));
    assert_eq!(transaction.phone_number.as_deref(), Some("0712345678"));

    // Provider confirms asynchronously.
    let status = app
        .state
        .services
        .payments
        .handle_mpesa_callback(mpesa_callback("ws_CO_TEST_1", 0, Some("ABC123")))
        .await
        .unwrap();
    assert_eq!(status, ReconcileStatus::Succeeded);

    let transaction = app
        .state
        .services
        .payments
        .get_transaction(transaction.id)
        .await
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Success);
    assert_eq!(transaction.receipt_number.as_deref(), Some("ABC123"));
    assert!(transaction.transaction_date.is_some());

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(order.paid_at.is_some());
    assert_eq!(order.payment_method.as_deref(), Some("mpesa"));

    // Payment confirmed clears the cart.
    let cart = app
        .state
        .services
        .cart
        .get_or_create_cart(customer)
        .await
        .unwrap();
    let view = app
        .state
        .services
        .cart
        .get_cart_with_items(cart.id)
        .await
        .unwrap();
    assert!(view.lines.is_empty());
}

#[tokio::test]
async fn duplicate_callback_is_idempotent() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let transaction = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::Mpesa,
            InitiatePaymentOpts {
                phone_number: Some("0712345678".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let callback = mpesa_callback("ws_CO_TEST_1", 0, Some("XYZ789"));
    let first = app
        .state
        .services
        .payments
        .handle_mpesa_callback(callback.clone())
        .await
        .unwrap();
    assert_eq!(first, ReconcileStatus::Succeeded);

    let second = app
        .state
        .services
        .payments
        .handle_mpesa_callback(callback)
        .await
        .unwrap();
    assert_eq!(second, ReconcileStatus::AlreadyReconciled);

    let transaction = app
        .state
        .services
        .payments
        .get_transaction(transaction.id)
        .await
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Success);
    assert_eq!(transaction.receipt_number.as_deref(), Some("XYZ789"));

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn failed_callback_marks_attempt_and_order_failed() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let transaction = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::Mpesa,
            InitiatePaymentOpts {
                phone_number: Some("0712345678".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let status = app
        .state
        .services
        .payments
        .handle_mpesa_callback(mpesa_callback("ws_CO_TEST_1", 1032, None))
        .await
        .unwrap();
    assert_eq!(status, ReconcileStatus::Failed);

    let transaction = app
        .state
        .services
        .payments
        .get_transaction(transaction.id)
        .await
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Failed);
    assert_eq!(
        transaction.notes.as_deref(),
        Some("Request cancelled by user")
    );

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn callback_for_unknown_attempt_is_a_noop() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let transaction = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::Mpesa,
            InitiatePaymentOpts {
                phone_number: Some("0712345678".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let status = app
        .state
        .services
        .payments
        .handle_mpesa_callback(mpesa_callback("ws_CO_SOMEONE_ELSE", 0, Some("XXX")))
        .await
        .unwrap();
    assert_eq!(status, ReconcileStatus::NoMatch);

    // The pending attempt is untouched.
    let transaction = app
        .state
        .services
        .payments
        .get_transaction(transaction.id)
        .await
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Pending);
    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn mpesa_requires_a_phone_number() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let result = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::Mpesa,
            InitiatePaymentOpts::default(),
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    // The audit row exists and records the failure.
    let rows = PaymentTransaction::find()
        .filter(payment_transaction::Column::OrderId.eq(order.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransactionStatus::Failed);
    assert!(rows[0].notes.as_deref().unwrap_or("").contains("Phone number"));

    // Order stays payable.
    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn stk_rejection_marks_transaction_failed() {
    let harness = payment_harness().await;
    let app = &harness.app;

    // Replace the accept-everything STK mock with a rejection.
    harness.mpesa.reset().await;
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "mpesa-test-token"
        })))
        .mount(&harness.mpesa)
        .await;
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "requestId": "12345-67890-1",
            "errorCode": "400.002.02",
            "errorMessage": "Bad Request - Invalid Amount"
        })))
        .mount(&harness.mpesa)
        .await;

    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let result = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::Mpesa,
            InitiatePaymentOpts {
                phone_number: Some("0712345678".to_string()),
                ..Default::default()
            },
        )
        .await;

    assert_matches!(result, Err(ServiceError::PaymentFailed(_)));

    let rows = PaymentTransaction::find()
        .filter(payment_transaction::Column::OrderId.eq(order.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransactionStatus::Failed);
    assert!(rows[0]
        .notes
        .as_deref()
        .unwrap_or("")
        .contains("Invalid Amount"));

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn paypal_initiate_returns_approval_url() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let transaction = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::PayPal,
            InitiatePaymentOpts {
                phone_number: None,
                return_url: Some("https://shop.example.com/payments/paypal/return".to_string()),
                cancel_url: Some("https://shop.example.com/payments/paypal/cancel".to_string()),
            },
        )
        .await
        .expect("initiate paypal payment");

    assert_eq!(transaction.status, TransactionStatus::Pending);
    assert_eq!(transaction.provider_ref.as_deref(), Some("PAY-TEST-1"));
    assert_eq!(
        transaction.payment_url.as_deref(),
        Some("https://www.sandbox.paypal.com/checkoutnow?token=EC-TEST")
    );
}

#[tokio::test]
async fn paypal_requires_redirect_urls() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let result = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::PayPal,
            InitiatePaymentOpts::default(),
        )
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn paypal_return_executes_and_pays_the_order() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let transaction = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::PayPal,
            InitiatePaymentOpts {
                phone_number: None,
                return_url: Some("https://shop.example.com/return".to_string()),
                cancel_url: Some("https://shop.example.com/cancel".to_string()),
            },
        )
        .await
        .unwrap();

    let status = app
        .state
        .services
        .payments
        .execute_paypal_return("PAY-TEST-1".to_string(), "PAYER-42".to_string())
        .await
        .unwrap();
    assert_eq!(status, ReconcileStatus::Succeeded);

    let transaction = app
        .state
        .services
        .payments
        .get_transaction(transaction.id)
        .await
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Success);
    assert_eq!(transaction.receipt_number.as_deref(), Some("SALE-TEST-9"));

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(order.paid_at.is_some());
}

#[tokio::test]
async fn paypal_cancel_leaves_everything_pending() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let transaction = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::PayPal,
            InitiatePaymentOpts {
                phone_number: None,
                return_url: Some("https://shop.example.com/return".to_string()),
                cancel_url: Some("https://shop.example.com/cancel".to_string()),
            },
        )
        .await
        .unwrap();

    app.state
        .services
        .payments
        .cancel_paypal_return(Some("PAY-TEST-1".to_string()))
        .await;

    let transaction = app
        .state
        .services
        .payments
        .get_transaction(transaction.id)
        .await
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Pending);

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    // The cart is still intact for another attempt.
    let cart = app
        .state
        .services
        .cart
        .get_or_create_cart(customer)
        .await
        .unwrap();
    let view = app
        .state
        .services
        .cart
        .get_cart_with_items(cart.id)
        .await
        .unwrap();
    assert_eq!(view.lines.len(), 1);
}

#[tokio::test]
async fn paypal_execution_rejection_marks_failure() {
    let harness = payment_harness().await;
    let app = &harness.app;

    // Execution declines after approval.
    harness.paypal.reset().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "paypal-test-token"
        })))
        .mount(&harness.paypal)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/payment"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "PAY-TEST-1",
            "links": [
                {"href": "https://www.sandbox.paypal.com/checkoutnow?token=EC-TEST", "rel": "approval_url", "method": "REDIRECT"}
            ]
        })))
        .mount(&harness.paypal)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/payment/PAY-TEST-1/execute"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "name": "INSTRUMENT_DECLINED",
            "message": "The instrument presented was either declined by the processor or bank."
        })))
        .mount(&harness.paypal)
        .await;

    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    let transaction = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::PayPal,
            InitiatePaymentOpts {
                phone_number: None,
                return_url: Some("https://shop.example.com/return".to_string()),
                cancel_url: Some("https://shop.example.com/cancel".to_string()),
            },
        )
        .await
        .unwrap();

    let status = app
        .state
        .services
        .payments
        .execute_paypal_return("PAY-TEST-1".to_string(), "PAYER-42".to_string())
        .await
        .unwrap();
    assert_eq!(status, ReconcileStatus::Failed);

    let transaction = app
        .state
        .services
        .payments
        .get_transaction(transaction.id)
        .await
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Failed);
    assert!(transaction
        .notes
        .as_deref()
        .unwrap_or("")
        .contains("INSTRUMENT_DECLINED"));
}

#[tokio::test]
async fn paypal_return_for_unknown_payment_is_a_noop() {
    let harness = payment_harness().await;
    let app = &harness.app;

    let status = app
        .state
        .services
        .payments
        .execute_paypal_return("PAY-NOBODY".to_string(), "PAYER-42".to_string())
        .await
        .unwrap();
    assert_eq!(status, ReconcileStatus::NoMatch);
}

#[tokio::test]
async fn sweep_expires_stale_pending_attempts() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    // A pending attempt whose STK prompt died two hours ago.
    let stale_id = Uuid::new_v4();
    payment_transaction::ActiveModel {
        id: Set(stale_id),
        customer_id: Set(customer),
        order_id: Set(Some(order.id)),
        phone_number: Set(Some("0712345678".to_string())),
        amount: Set(order.total),
        payment_method: Set(PaymentMethod::Mpesa),
        status: Set(TransactionStatus::Pending),
        provider_ref: Set(Some("ws_CO_STALE".to_string())),
        receipt_number: Set(None),
        payment_url: Set(None),
        notes: Set(None),
        transaction_date: Set(None),
        created_at: Set(Utc::now() - Duration::hours(2)),
        updated_at: Set(Utc::now() - Duration::hours(2)),
    }
    .insert(&*app.state.db)
    .await
    .unwrap();

    // A fresh attempt that must not be touched.
    let fresh = app
        .state
        .services
        .payments
        .initiate_payment(
            customer,
            order.id,
            PaymentMethod::Mpesa,
            InitiatePaymentOpts {
                phone_number: Some("0712345678".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let expired = app
        .state
        .services
        .payments
        .expire_stale_transactions()
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let stale = app
        .state
        .services
        .payments
        .get_transaction(stale_id)
        .await
        .unwrap();
    assert_eq!(stale.status, TransactionStatus::Expired);

    let fresh = app
        .state
        .services
        .payments
        .get_transaction(fresh.id)
        .await
        .unwrap();
    assert_eq!(fresh.status, TransactionStatus::Pending);

    let order = Order::find_by_id(order.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn late_callback_can_still_settle_an_expired_attempt() {
    let harness = payment_harness().await;
    let app = &harness.app;
    let customer = Uuid::new_v4();
    let order = place_order(app, customer).await;

    payment_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer),
        order_id: Set(Some(order.id)),
        phone_number: Set(Some("0712345678".to_string())),
        amount: Set(order.total),
        payment_method: Set(PaymentMethod::Mpesa),
        status: Set(TransactionStatus::Expired),
        provider_ref: Set(Some("ws_CO_LATE".to_string())),
        receipt_number: Set(None),
        payment_url: Set(None),
        notes: Set(None),
        transaction_date: Set(None),
        created_at: Set(Utc::now() - Duration::hours(3)),
        updated_at: Set(Utc::now() - Duration::hours(1)),
    }
    .insert(&*app.state.db)
    .await
    .unwrap();

    // The money actually moved; the provider's confirmation just arrived
    // after the sweep.
    let status = app
        .state
        .services
        .payments
        .handle_mpesa_callback(mpesa_callback("ws_CO_LATE", 0, Some("LATE42")))
        .await
        .unwrap();
    assert_eq!(status, ReconcileStatus::Succeeded);

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}
