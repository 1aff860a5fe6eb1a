use crate::{
    config::PayPalConfig,
    entities::{address, order, order_item, payment_transaction::PaymentMethod},
    errors::ServiceError,
    services::payments::{
        currency::{convert_kes_to_usd, ExchangeRateCache},
        gateway::{
            InitiatePaymentOpts, PaymentGateway, ProviderHandle, ProviderNotification,
            Reconciliation, ReconcileOutcome,
        },
    },
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// PayPal REST gateway (redirect-based approval flow). The store runs in
/// KES while PayPal charges in USD, so line items are converted per line
/// and the rounding drift balanced before submission.
pub struct PayPalGateway {
    http: reqwest::Client,
    config: PayPalConfig,
    rates: Arc<ExchangeRateCache>,
}

impl PayPalGateway {
    pub fn new(config: PayPalConfig, rates: Arc<ExchangeRateCache>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            rates,
        }
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let response: TokenResponse = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.base_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("PayPal auth unreachable: {}", e))
            })?
            .error_for_status()
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal auth failed: {}", e)))?
            .json()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("Invalid PayPal auth response: {}", e))
            })?;

        Ok(response.access_token)
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayPal
    }

    #[instrument(skip(self, order, items, shipping_address, opts), fields(order_number = %order.order_number))]
    async fn initiate(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
        shipping_address: &address::Model,
        opts: &InitiatePaymentOpts,
    ) -> Result<ProviderHandle, ServiceError> {
        let (return_url, cancel_url) = match (&opts.return_url, &opts.cancel_url) {
            (Some(r), Some(c)) => (r, c),
            _ => {
                return Err(ServiceError::ValidationError(
                    "Return and cancel URLs are required for PayPal payments".to_string(),
                ))
            }
        };

        let rate = self.rates.usd_rate().await?;
        let declared_total = convert_kes_to_usd(order.total, rate);

        let mut lines: Vec<UsdLine> = items
            .iter()
            .map(|item| UsdLine {
                name: item.product_name.clone(),
                sku: item.product_id.to_string(),
                unit_price: convert_kes_to_usd(item.unit_price, rate),
                quantity: item.quantity,
            })
            .collect();
        balance_line_items(&mut lines, declared_total);

        let item_payload: Vec<serde_json::Value> = lines
            .iter()
            .map(|line| {
                json!({
                    "name": line.name,
                    "sku": line.sku,
                    "price": format!("{:.2}", line.unit_price),
                    "currency": "USD",
                    "quantity": line.quantity,
                })
            })
            .collect();

        let payload = json!({
            "intent": "sale",
            "payer": { "payment_method": "paypal" },
            "redirect_urls": {
                "return_url": return_url,
                "cancel_url": cancel_url,
            },
            "transactions": [{
                "item_list": {
                    "items": item_payload,
                    "shipping_address": {
                        "recipient_name": shipping_address.recipient_name(),
                        "line1": shipping_address.street_address,
                        "line2": shipping_address.apartment.clone().unwrap_or_default(),
                        "city": shipping_address.city,
                        "state": shipping_address.county,
                        "postal_code": shipping_address.postal_code,
                        "country_code": "KE",
                    },
                },
                "amount": {
                    "total": format!("{:.2}", declared_total),
                    "currency": "USD",
                },
                "description": format!("Payment for Order #{}", order.order_number),
            }],
        });

        let access_token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/v1/payments/payment", self.config.base_url))
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("PayPal unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::PaymentFailed(format!(
                "PayPal payment creation failed: {}",
                message
            )));
        }

        let created: CreatePaymentResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Invalid PayPal response: {}", e))
        })?;

        let approval_url = created
            .links
            .iter()
            .find(|link| link.rel == "approval_url")
            .map(|link| link.href.clone())
            .ok_or_else(|| {
                ServiceError::PaymentFailed("PayPal response missing approval URL".to_string())
            })?;

        info!(payment_id = %created.id, "PayPal payment created");
        Ok(ProviderHandle {
            provider_ref: created.id,
            approval_url: Some(approval_url),
        })
    }

    /// Executes the approved payment. A provider-side rejection is a
    /// failed reconciliation, not a transport error; transport errors
    /// propagate so the attempt stays pending and retryable.
    async fn reconcile(
        &self,
        notification: ProviderNotification,
    ) -> Result<Reconciliation, ServiceError> {
        let ProviderNotification::PayPalApproval {
            payment_id,
            payer_id,
        } = notification
        else {
            return Err(ServiceError::InvalidOperation(
                "Unexpected notification type for PayPal".to_string(),
            ));
        };

        let access_token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v1/payments/payment/{}/execute",
                self.config.base_url, payment_id
            ))
            .bearer_auth(access_token)
            .json(&json!({ "payer_id": payer_id }))
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("PayPal unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(%payment_id, "PayPal execution rejected: {}", message);
            return Ok(Reconciliation {
                provider_ref: payment_id,
                outcome: ReconcileOutcome::Failed {
                    reason: format!("PayPal payment execution failed: {}", message),
                },
            });
        }

        let executed: ExecutePaymentResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Invalid PayPal response: {}", e))
        })?;

        let sale_id = executed
            .transactions
            .iter()
            .flat_map(|t| t.related_resources.iter())
            .find_map(|resource| resource.sale.as_ref().map(|sale| sale.id.clone()));

        Ok(Reconciliation {
            provider_ref: payment_id,
            outcome: ReconcileOutcome::Success { receipt: sale_id },
        })
    }
}

/// One USD line item queued for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsdLine {
    pub name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Per-line currency conversion rounds independently, so the item sum
/// can drift a few cents from the converted order total — which PayPal
/// rejects. The drift is folded into the last line: a per-unit bump when
/// it divides evenly, otherwise the line collapses to quantity 1 at its
/// adjusted line total.
pub fn balance_line_items(lines: &mut [UsdLine], declared_total: Decimal) {
    let sum: Decimal = lines
        .iter()
        .map(|l| l.unit_price * Decimal::from(l.quantity))
        .sum();
    let diff = declared_total - sum;
    if diff.is_zero() {
        return;
    }

    let Some(last) = lines.last_mut() else { return };
    let quantity = Decimal::from(last.quantity);
    let per_unit = diff / quantity;

    if per_unit == per_unit.round_dp(2) {
        last.unit_price += per_unit;
    } else {
        last.unit_price = last.unit_price * quantity + diff;
        last.quantity = 1;
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    id: String,
    #[serde(default)]
    links: Vec<PaymentLink>,
}

#[derive(Debug, Deserialize)]
struct PaymentLink {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct ExecutePaymentResponse {
    #[serde(default)]
    transactions: Vec<ExecutedTransaction>,
}

#[derive(Debug, Deserialize)]
struct ExecutedTransaction {
    #[serde(default)]
    related_resources: Vec<RelatedResource>,
}

#[derive(Debug, Deserialize)]
struct RelatedResource {
    #[serde(default)]
    sale: Option<Sale>,
}

#[derive(Debug, Deserialize)]
struct Sale {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(price: Decimal, quantity: i32) -> UsdLine {
        UsdLine {
            name: "Item".into(),
            sku: "sku".into(),
            unit_price: price,
            quantity,
        }
    }

    fn sum(lines: &[UsdLine]) -> Decimal {
        lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum()
    }

    #[test]
    fn no_adjustment_when_totals_already_match() {
        let mut lines = vec![line(dec!(7.70), 2), line(dec!(3.85), 1)];
        balance_line_items(&mut lines, dec!(19.25));
        assert_eq!(lines[0].unit_price, dec!(7.70));
        assert_eq!(lines[1].unit_price, dec!(3.85));
    }

    #[test]
    fn evenly_divisible_drift_bumps_last_unit_price() {
        // Sum = 10.00, declared 10.02, last line qty 2 -> +0.01 per unit
        let mut lines = vec![line(dec!(5.00), 1), line(dec!(2.50), 2)];
        balance_line_items(&mut lines, dec!(10.02));

        assert_eq!(lines[1].unit_price, dec!(2.51));
        assert_eq!(lines[1].quantity, 2);
        assert_eq!(sum(&lines), dec!(10.02));
    }

    #[test]
    fn indivisible_drift_collapses_last_line() {
        // Sum = 10.00, declared 10.01, last line qty 3: 0.01/3 does not
        // round to cents, so the line becomes qty 1 at 7.51.
        let mut lines = vec![line(dec!(2.50), 1), line(dec!(2.50), 3)];
        balance_line_items(&mut lines, dec!(10.01));

        assert_eq!(lines[1].quantity, 1);
        assert_eq!(lines[1].unit_price, dec!(7.51));
        assert_eq!(sum(&lines), dec!(10.01));
    }

    #[test]
    fn negative_drift_is_balanced_too() {
        let mut lines = vec![line(dec!(5.01), 2)];
        balance_line_items(&mut lines, dec!(10.00));
        assert_eq!(sum(&lines), dec!(10.00));
    }
}
