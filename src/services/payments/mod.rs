pub mod currency;
pub mod gateway;
pub mod mpesa;
pub mod paypal;

use crate::{
    config::AppConfig,
    entities::{
        cart, order,
        order_item,
        payment_transaction::{self, PaymentMethod, TransactionStatus},
        Address, Cart, Order, OrderItem, PaymentTransaction,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{cart::CartService, notifications::Notifier},
};
use chrono::{Duration, Utc};
use self::gateway::{
    InitiatePaymentOpts, PaymentGateway, ProviderNotification, Reconciliation, ReconcileOutcome,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Gateways available to this deployment, keyed by payment method.
pub type GatewayRegistry = HashMap<PaymentMethod, Arc<dyn PaymentGateway>>;

/// Outcome of applying a provider notification to local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// No transaction matches the provider handle; deliberately a no-op
    /// since the provider cannot act on an error from us.
    NoMatch,
    /// The transaction was already reconciled successfully; re-applying
    /// is a no-op.
    AlreadyReconciled,
    Succeeded,
    Failed,
}

/// Payment orchestrator: creates the transaction ledger row, dispatches
/// to the right gateway, and owns both reconciliation entry points
/// (M-Pesa webhook, PayPal redirect) plus the stale-attempt sweep.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    config: Arc<AppConfig>,
    registry: Arc<GatewayRegistry>,
    notifier: Arc<dyn Notifier>,
    cart_service: CartService,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: Arc<AppConfig>,
        registry: GatewayRegistry,
        notifier: Arc<dyn Notifier>,
        cart_service: CartService,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            registry: Arc::new(registry),
            notifier,
            cart_service,
        }
    }

    /// Starts a payment attempt for an order. The ledger row is written
    /// and committed before the gateway is called, so a crash mid-call
    /// still leaves an audit record; a gateway rejection marks the row
    /// failed and leaves the order unpaid.
    #[instrument(skip(self, opts))]
    pub async fn initiate_payment(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
        method: PaymentMethod,
        opts: InitiatePaymentOpts,
    ) -> Result<payment_transaction::Model, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.customer_id != customer_id {
            return Err(ServiceError::InvalidOperation(
                "Order does not belong to this customer".to_string(),
            ));
        }
        if order.payment_status == order::PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(
                "Order is already paid".to_string(),
            ));
        }

        let gateway = self.registry.get(&method).cloned().ok_or_else(|| {
            ServiceError::ConfigError(format!(
                "Payment method {} is not configured",
                method.as_str()
            ))
        })?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        let shipping_address = Address::find_by_id(order.shipping_address_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Address {} not found",
                    order.shipping_address_id
                ))
            })?;

        let now = Utc::now();
        let record = payment_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            order_id: Set(Some(order_id)),
            phone_number: Set(opts.phone_number.clone()),
            amount: Set(order.total),
            payment_method: Set(method),
            status: Set(TransactionStatus::Pending),
            provider_ref: Set(None),
            receipt_number: Set(None),
            payment_url: Set(None),
            notes: Set(None),
            transaction_date: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let record = record.insert(&*self.db).await?;

        match gateway
            .initiate(&order, &items, &shipping_address, &opts)
            .await
        {
            Ok(handle) => {
                let mut active: payment_transaction::ActiveModel = record.into();
                active.provider_ref = Set(Some(handle.provider_ref.clone()));
                active.payment_url = Set(handle.approval_url.clone());
                active.updated_at = Set(Utc::now());
                let record = active.update(&*self.db).await?;

                let mut order_active: order::ActiveModel = order.into();
                order_active.payment_method = Set(Some(method.as_str().to_string()));
                order_active.updated_at = Set(Utc::now());
                order_active.update(&*self.db).await?;

                self.event_sender
                    .send_or_log(Event::PaymentInitiated {
                        transaction_id: record.id,
                        order_id,
                        method: method.as_str().to_string(),
                        amount: record.amount,
                    })
                    .await;

                info!(
                    transaction_id = %record.id,
                    provider_ref = ?record.provider_ref,
                    "Payment initiated"
                );
                Ok(record)
            }
            Err(e) => {
                let reason = e.to_string();
                let transaction_id = record.id;

                let mut active: payment_transaction::ActiveModel = record.into();
                active.status = Set(TransactionStatus::Failed);
                active.notes = Set(Some(reason.clone()));
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;

                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        transaction_id,
                        order_id: Some(order_id),
                        reason,
                    })
                    .await;

                Err(e)
            }
        }
    }

    /// Reconciliation entry point for the M-Pesa STK webhook.
    #[instrument(skip(self, payload))]
    pub async fn handle_mpesa_callback(
        &self,
        payload: serde_json::Value,
    ) -> Result<ReconcileStatus, ServiceError> {
        let gateway = match self.registry.get(&PaymentMethod::Mpesa) {
            Some(gateway) => gateway.clone(),
            None => {
                warn!("M-Pesa callback received but the gateway is not configured");
                return Ok(ReconcileStatus::NoMatch);
            }
        };

        let reconciliation = gateway
            .reconcile(ProviderNotification::MpesaCallback(payload))
            .await?;

        self.apply_reconciliation(PaymentMethod::Mpesa, reconciliation)
            .await
    }

    /// Reconciliation entry point for the PayPal return redirect:
    /// executes the approved payment, then applies the result.
    #[instrument(skip(self))]
    pub async fn execute_paypal_return(
        &self,
        payment_id: String,
        payer_id: String,
    ) -> Result<ReconcileStatus, ServiceError> {
        let known = PaymentTransaction::find()
            .filter(payment_transaction::Column::ProviderRef.eq(payment_id.clone()))
            .filter(payment_transaction::Column::PaymentMethod.eq(PaymentMethod::PayPal))
            .one(&*self.db)
            .await?;

        let Some(known) = known else {
            warn!(%payment_id, "PayPal return for unknown payment id");
            return Ok(ReconcileStatus::NoMatch);
        };
        if known.status == TransactionStatus::Success {
            return Ok(ReconcileStatus::AlreadyReconciled);
        }

        let gateway = self
            .registry
            .get(&PaymentMethod::PayPal)
            .cloned()
            .ok_or_else(|| {
                ServiceError::ConfigError("Payment method paypal is not configured".to_string())
            })?;

        let reconciliation = gateway
            .reconcile(ProviderNotification::PayPalApproval {
                payment_id,
                payer_id,
            })
            .await?;

        self.apply_reconciliation(PaymentMethod::PayPal, reconciliation)
            .await
    }

    /// The payer backed out on PayPal's side. Nothing changes locally:
    /// the attempt stays pending until the sweep expires it, and the
    /// order remains payable.
    #[instrument(skip(self))]
    pub async fn cancel_paypal_return(&self, payment_id: Option<String>) {
        info!(
            payment_id = payment_id.as_deref().unwrap_or("-"),
            "PayPal payment cancelled by payer"
        );
    }

    pub async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<payment_transaction::Model, ServiceError> {
        PaymentTransaction::find_by_id(transaction_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Transaction {} not found", transaction_id))
            })
    }

    /// Applies a provider result to the ledger and the order, in one
    /// transaction. Transition to success is idempotent: re-delivered
    /// notifications find the row already reconciled and do nothing.
    async fn apply_reconciliation(
        &self,
        method: PaymentMethod,
        reconciliation: Reconciliation,
    ) -> Result<ReconcileStatus, ServiceError> {
        let db_txn = self.db.begin().await?;

        let record = PaymentTransaction::find()
            .filter(payment_transaction::Column::ProviderRef.eq(reconciliation.provider_ref.clone()))
            .filter(payment_transaction::Column::PaymentMethod.eq(method))
            .one(&db_txn)
            .await?;

        let Some(record) = record else {
            warn!(
                provider_ref = %reconciliation.provider_ref,
                method = method.as_str(),
                "Notification matches no transaction; ignoring"
            );
            return Ok(ReconcileStatus::NoMatch);
        };

        if record.status == TransactionStatus::Success {
            info!(
                transaction_id = %record.id,
                "Transaction already reconciled; ignoring duplicate notification"
            );
            return Ok(ReconcileStatus::AlreadyReconciled);
        }

        let transaction_id = record.id;
        let order = match record.order_id {
            Some(order_id) => Order::find_by_id(order_id).one(&db_txn).await?,
            None => None,
        };

        match reconciliation.outcome {
            ReconcileOutcome::Success { receipt } => {
                let customer_id = record.customer_id;
                let now = Utc::now();

                let mut active: payment_transaction::ActiveModel = record.into();
                active.status = Set(TransactionStatus::Success);
                active.receipt_number = Set(receipt.clone());
                active.transaction_date = Set(Some(now));
                active.updated_at = Set(now);
                active.update(&db_txn).await?;

                let order = match order {
                    Some(order) => {
                        let order_id = order.id;
                        let mut order_active: order::ActiveModel = order.into();
                        order_active.payment_status = Set(order::PaymentStatus::Paid);
                        order_active.paid_at = Set(Some(now));
                        order_active.updated_at = Set(now);
                        Some((order_id, order_active.update(&db_txn).await?))
                    }
                    None => None,
                };

                if self.config.clear_cart_after_payment {
                    self.clear_customer_cart(&db_txn, customer_id).await?;
                }

                db_txn.commit().await?;

                if let Some((order_id, order)) = &order {
                    self.event_sender
                        .send_or_log(Event::PaymentSucceeded {
                            transaction_id,
                            order_id: *order_id,
                            receipt: receipt.clone(),
                        })
                        .await;
                    self.notifier
                        .payment_receipt(order, receipt.as_deref())
                        .await;
                }

                info!(%transaction_id, "Payment reconciled as successful");
                Ok(ReconcileStatus::Succeeded)
            }
            ReconcileOutcome::Failed { reason } => {
                let order_id = record.order_id;

                let mut active: payment_transaction::ActiveModel = record.into();
                active.status = Set(TransactionStatus::Failed);
                active.notes = Set(Some(reason.clone()));
                active.updated_at = Set(Utc::now());
                active.update(&db_txn).await?;

                if let Some(order) = order {
                    if order.payment_status == order::PaymentStatus::Pending {
                        let mut order_active: order::ActiveModel = order.into();
                        order_active.payment_status = Set(order::PaymentStatus::Failed);
                        order_active.updated_at = Set(Utc::now());
                        order_active.update(&db_txn).await?;
                    }
                }

                db_txn.commit().await?;

                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        transaction_id,
                        order_id,
                        reason,
                    })
                    .await;

                info!(%transaction_id, "Payment reconciled as failed");
                Ok(ReconcileStatus::Failed)
            }
        }
    }

    /// Marks pending attempts older than the configured threshold as
    /// expired. Run periodically; covers STK prompts that timed out and
    /// PayPal approvals the payer never returned from.
    #[instrument(skip(self))]
    pub async fn expire_stale_transactions(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - Duration::minutes(self.config.payment_expiry_minutes);

        let stale = PaymentTransaction::find()
            .filter(payment_transaction::Column::Status.eq(TransactionStatus::Pending))
            .filter(payment_transaction::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?;

        let mut expired = 0u64;
        for record in stale {
            let transaction_id = record.id;
            let order_id = record.order_id;

            let mut active: payment_transaction::ActiveModel = record.into();
            active.status = Set(TransactionStatus::Expired);
            active.updated_at = Set(Utc::now());

            match active.update(&*self.db).await {
                Ok(_) => {
                    expired += 1;
                    if let Some(order_id) = order_id {
                        if let Some(order) = Order::find_by_id(order_id).one(&*self.db).await? {
                            if order.payment_status == order::PaymentStatus::Pending {
                                let mut order_active: order::ActiveModel = order.into();
                                order_active.payment_status = Set(order::PaymentStatus::Failed);
                                order_active.updated_at = Set(Utc::now());
                                order_active.update(&*self.db).await?;
                            }
                        }
                    }
                    self.event_sender
                        .send_or_log(Event::PaymentExpired { transaction_id })
                        .await;
                    info!(%transaction_id, "Marked stale payment attempt as expired");
                }
                Err(e) => {
                    warn!(%transaction_id, error = %e, "Failed to expire transaction");
                }
            }
        }

        Ok(expired)
    }

    async fn clear_customer_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<(), ServiceError> {
        let customer_cart = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?;

        if let Some(customer_cart) = customer_cart {
            self.cart_service.clear_cart(conn, customer_cart.id).await?;
        }

        Ok(())
    }
}
