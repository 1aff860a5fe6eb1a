use crate::{
    entities::{address, order, order_item, payment_transaction::PaymentMethod},
    errors::ServiceError,
};
use async_trait::async_trait;
use serde::Deserialize;

/// Provider-specific knobs supplied at initiation time. M-Pesa needs the
/// payer's phone; PayPal needs the redirect pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitiatePaymentOpts {
    pub phone_number: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// Handle returned by a successful initiation. `provider_ref` is the
/// key later notifications are matched on (Daraja CheckoutRequestID,
/// PayPal payment id).
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    pub provider_ref: String,
    /// Where to send the payer, for redirect-based providers
    pub approval_url: Option<String>,
}

/// An asynchronous completion signal from a provider.
#[derive(Debug, Clone)]
pub enum ProviderNotification {
    /// Inbound Daraja STK webhook body
    MpesaCallback(serde_json::Value),
    /// Query parameters carried back on the PayPal return redirect
    PayPalApproval {
        payment_id: String,
        payer_id: String,
    },
}

/// Result of interpreting (and, for PayPal, executing) a notification.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub provider_ref: String,
    pub outcome: ReconcileOutcome,
}

#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Success { receipt: Option<String> },
    Failed { reason: String },
}

/// One implementation per provider; the orchestrator selects from a
/// registry keyed by payment method.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Starts a charge for the order. Must not mutate local state; the
    /// orchestrator persists the returned handle.
    async fn initiate(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
        shipping_address: &address::Model,
        opts: &InitiatePaymentOpts,
    ) -> Result<ProviderHandle, ServiceError>;

    /// Interprets this provider's completion signal. For M-Pesa this is
    /// pure payload parsing; for PayPal it executes the approved payment
    /// against the provider API.
    async fn reconcile(
        &self,
        notification: ProviderNotification,
    ) -> Result<Reconciliation, ServiceError>;
}
