use crate::entities::order;
use async_trait::async_trait;
use tracing::info;

/// Fire-and-forget customer notifications. Actual delivery (email, SMS)
/// is an external collaborator; failures here must never affect payment
/// or order state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_confirmation(&self, order: &order::Model);

    /// Sent after a payment is confirmed, with the provider receipt.
    async fn payment_receipt(&self, order: &order::Model, receipt: Option<&str>);
}

/// Log-backed notifier used until a real delivery channel is wired in.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_confirmation(&self, order: &order::Model) {
        info!(
            order_number = %order.order_number,
            customer_id = %order.customer_id,
            "order confirmation notification"
        );
    }

    async fn payment_receipt(&self, order: &order::Model, receipt: Option<&str>) {
        info!(
            order_number = %order.order_number,
            customer_id = %order.customer_id,
            receipt = receipt.unwrap_or("-"),
            "payment receipt notification"
        );
    }
}
