use crate::{
    config::AppConfig,
    entities::{
        address, cart, order, order_item, Address, Cart, Order,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{cart::CartService, notifications::Notifier},
};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Converts a validated cart into an order. Totals, line snapshots and
/// the order row are written in one transaction; any failure leaves the
/// cart and its reservations untouched.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    config: Arc<AppConfig>,
    cart_service: CartService,
    notifier: Arc<dyn Notifier>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: Arc<AppConfig>,
        cart_service: CartService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            cart_service,
            notifier,
        }
    }

    /// Creates an order from the customer's cart.
    ///
    /// The cart is deliberately left intact: it is cleared only after a
    /// successful payment, so a failed payment initiation keeps the
    /// checkout retry-safe.
    #[instrument(skip(self, input))]
    pub async fn create_order_from_cart(
        &self,
        customer_id: Uuid,
        input: CheckoutInput,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InvalidOperation("Cart is empty".to_string()))?;

        let lines = self.cart_service.cart_lines(&txn, cart.id).await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let shipping_address = self
            .load_owned_address(&txn, input.shipping_address_id, customer_id)
            .await?;
        let billing_address = match input.billing_address_id {
            Some(id) => self.load_owned_address(&txn, id, customer_id).await?,
            None => shipping_address.clone(),
        };

        let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
        let tax_rate =
            Decimal::from_f64_retain(self.config.tax_rate).unwrap_or(Decimal::ZERO);
        let tax = (subtotal * tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let shipping_cost = Decimal::from_f64_retain(self.config.flat_shipping_rate)
            .unwrap_or(Decimal::ZERO)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let total = subtotal + shipping_cost + tax;

        let order_number = self.generate_order_number(&txn).await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(customer_id),
            status: Set(order::OrderStatus::Pending),
            payment_status: Set(order::PaymentStatus::Pending),
            subtotal: Set(subtotal),
            shipping_cost: Set(shipping_cost),
            tax: Set(tax),
            total: Set(total),
            shipping_address_id: Set(shipping_address.id),
            billing_address_id: Set(billing_address.id),
            payment_method: Set(input.payment_method.clone()),
            notes: Set(input.notes.clone()),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = order_model.insert(&txn).await?;

        for line in &lines {
            let variant_info = line.variant.as_ref().map(|v| {
                serde_json::json!({
                    "size": v.size,
                    "color": v.color,
                })
            });

            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product.id),
                variant_id: Set(line.variant.as_ref().map(|v| v.id)),
                product_name: Set(line.product.title.clone()),
                variant_info: Set(variant_info),
                unit_price: Set(line.unit_price),
                quantity: Set(line.item.quantity),
                subtotal: Set(line.line_total),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                cart_id: cart.id,
                order_id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;
        self.notifier.order_confirmation(&created).await;

        info!(
            order_id = %order_id,
            order_number = %order_number,
            total = %total,
            "Order created from cart"
        );
        Ok(created)
    }

    /// Stores a new customer address.
    #[instrument(skip(self, input))]
    pub async fn create_address(
        &self,
        customer_id: Uuid,
        input: CreateAddressInput,
    ) -> Result<address::Model, ServiceError> {
        let model = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            first_name: Set(input.first_name),
            last_name: Set(input.last_name),
            street_address: Set(input.street_address),
            apartment: Set(input.apartment),
            city: Set(input.city),
            county: Set(input.county),
            postal_code: Set(input.postal_code),
            phone: Set(input.phone),
            created_at: Set(Utc::now()),
        };

        Ok(model.insert(&*self.db).await?)
    }

    /// All addresses on file for the customer.
    pub async fn list_addresses(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<address::Model>, ServiceError> {
        Ok(Address::find()
            .filter(address::Column::CustomerId.eq(customer_id))
            .all(&*self.db)
            .await?)
    }

    async fn load_owned_address<C: ConnectionTrait>(
        &self,
        conn: &C,
        address_id: Uuid,
        customer_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        let found = Address::find_by_id(address_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;

        if found.customer_id != customer_id {
            return Err(ServiceError::ValidationError(
                "Address does not belong to this customer".to_string(),
            ));
        }

        Ok(found)
    }

    /// Short unique order number. Collisions are vanishingly rare but
    /// not impossible, so generation retries against the live table.
    async fn generate_order_number<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<String, ServiceError> {
        for attempt in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = format!("ORD-{:08X}", rand::random::<u32>());

            let taken = Order::find()
                .filter(order::Column::OrderNumber.eq(candidate.clone()))
                .one(conn)
                .await?
                .is_some();

            if !taken {
                return Ok(candidate);
            }

            warn!(attempt, %candidate, "Order number collision, retrying");
        }

        Err(ServiceError::InternalError(
            "Could not generate a unique order number".to_string(),
        ))
    }
}

/// Checkout submission
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub shipping_address_id: Uuid,
    pub billing_address_id: Option<Uuid>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

/// New-address submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAddressInput {
    pub first_name: String,
    pub last_name: String,
    pub street_address: String,
    pub apartment: Option<String>,
    pub city: String,
    pub county: String,
    pub postal_code: String,
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use rust_decimal::{Decimal, RoundingStrategy};
    use rust_decimal_macros::dec;

    #[test]
    fn vat_is_sixteen_percent_of_subtotal() {
        let subtotal = dec!(1000.00);
        let tax_rate = Decimal::from_f64_retain(0.16).unwrap();
        let tax = (subtotal * tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        assert_eq!(tax, dec!(160.00));
        assert_eq!(subtotal + Decimal::ZERO + tax, dec!(1160.00));
    }

    #[test]
    fn tax_rounds_to_cents() {
        let subtotal = dec!(66.67);
        let tax_rate = Decimal::from_f64_retain(0.16).unwrap();
        let tax = (subtotal * tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        assert_eq!(tax, dec!(10.67));
    }

    #[test]
    fn order_number_shape() {
        let n = format!("ORD-{:08X}", 0xABCDu32);
        assert_eq!(n, "ORD-0000ABCD");
        assert_eq!(n.len(), 12);
        assert!(n.starts_with("ORD-"));
    }
}
