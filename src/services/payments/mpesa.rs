use crate::{
    config::MpesaConfig,
    entities::{address, order, order_item, payment_transaction::PaymentMethod},
    errors::ServiceError,
    services::payments::gateway::{
        InitiatePaymentOpts, PaymentGateway, ProviderHandle, ProviderNotification, Reconciliation,
        ReconcileOutcome,
    },
};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

/// M-Pesa Daraja STK-push gateway. Initiation pushes a PIN prompt to the
/// payer's phone; the final result arrives later on the webhook, keyed
/// by CheckoutRequestID.
pub struct MpesaGateway {
    http: reqwest::Client,
    config: MpesaConfig,
    callback_url: String,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig, callback_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            callback_url,
        }
    }

    /// Client-credentials token for the Daraja API.
    async fn access_token(&self) -> Result<String, ServiceError> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );

        let response: TokenResponse = self
            .http
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("M-Pesa auth unreachable: {}", e))
            })?
            .error_for_status()
            .map_err(|e| ServiceError::ExternalServiceError(format!("M-Pesa auth failed: {}", e)))?
            .json()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("Invalid M-Pesa auth response: {}", e))
            })?;

        Ok(response.access_token)
    }

    /// Daraja request password: base64(shortcode + passkey + timestamp).
    fn generate_password(&self, timestamp: &str) -> String {
        let raw = format!("{}{}{}", self.config.shortcode, self.config.passkey, timestamp);
        base64::engine::general_purpose::STANDARD.encode(raw)
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Mpesa
    }

    #[instrument(skip(self, order, _items, _shipping_address, opts), fields(order_number = %order.order_number))]
    async fn initiate(
        &self,
        order: &order::Model,
        _items: &[order_item::Model],
        _shipping_address: &address::Model,
        opts: &InitiatePaymentOpts,
    ) -> Result<ProviderHandle, ServiceError> {
        let phone = opts.phone_number.as_deref().ok_or_else(|| {
            ServiceError::ValidationError("Phone number is required for M-Pesa payments".to_string())
        })?;
        let phone = format_phone_number(phone)?;

        // Daraja takes whole-shilling amounts.
        let amount = order.total.trunc().to_i64().ok_or_else(|| {
            ServiceError::ValidationError(format!("Order total {} not chargeable", order.total))
        })?;

        let access_token = self.access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = self.generate_password(&timestamp);

        let payload = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount,
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.callback_url,
            "AccountReference": format!("Order_{}", order.order_number),
            "TransactionDesc": "Payment for order",
        });

        let response = self
            .http
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.config.base_url
            ))
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("M-Pesa STK push unreachable: {}", e))
            })?;

        let body: StkPushResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Invalid STK push response: {}", e))
        })?;

        match body.checkout_request_id {
            Some(checkout_request_id) => {
                info!(%checkout_request_id, "STK push accepted");
                Ok(ProviderHandle {
                    provider_ref: checkout_request_id,
                    approval_url: None,
                })
            }
            None => Err(ServiceError::PaymentFailed(
                body.error_message
                    .unwrap_or_else(|| "STK push rejected by provider".to_string()),
            )),
        }
    }

    async fn reconcile(
        &self,
        notification: ProviderNotification,
    ) -> Result<Reconciliation, ServiceError> {
        let ProviderNotification::MpesaCallback(payload) = notification else {
            return Err(ServiceError::InvalidOperation(
                "Unexpected notification type for M-Pesa".to_string(),
            ));
        };

        parse_stk_callback(payload)
    }
}

/// Interprets a Daraja STK callback body. ResultCode 0 is success, with
/// the receipt inside the metadata item list.
pub fn parse_stk_callback(payload: serde_json::Value) -> Result<Reconciliation, ServiceError> {
    let envelope: StkCallbackEnvelope = serde_json::from_value(payload)
        .map_err(|e| ServiceError::ValidationError(format!("Malformed STK callback: {}", e)))?;
    let callback = envelope.body.stk_callback;

    let outcome = if callback.result_code == 0 {
        let receipt = callback
            .callback_metadata
            .as_ref()
            .and_then(|m| {
                m.items
                    .iter()
                    .find(|item| item.name == "MpesaReceiptNumber")
            })
            .and_then(|item| item.value.as_ref())
            .map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        ReconcileOutcome::Success { receipt }
    } else {
        ReconcileOutcome::Failed {
            reason: callback
                .result_desc
                .unwrap_or_else(|| format!("STK push failed with code {}", callback.result_code)),
        }
    };

    Ok(Reconciliation {
        provider_ref: callback.checkout_request_id,
        outcome,
    })
}

/// Normalises a Kenyan MSISDN to the 2547XXXXXXXX form Daraja expects.
pub fn format_phone_number(phone: &str) -> Result<String, ServiceError> {
    let mut cleaned: String = phone
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '+'))
        .collect();

    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(ServiceError::ValidationError(format!(
            "Invalid phone number: {}",
            phone
        )));
    }

    if let Some(stripped) = cleaned.strip_prefix('0') {
        cleaned = stripped.to_string();
    }
    if !cleaned.starts_with("254") {
        cleaned = format!("254{}", cleaned);
    }

    if cleaned.len() != 12 {
        return Err(ServiceError::ValidationError(
            "Phone number must be 9 digits after the country prefix".to_string(),
        ));
    }

    Ok(cleaned)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    body: StkCallbackBody,
}

#[derive(Debug, Deserialize, Serialize)]
struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Debug, Deserialize, Serialize)]
struct StkCallback {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata", default)]
    callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize, Serialize)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value", default)]
    value: Option<serde_json::Value>,
}
