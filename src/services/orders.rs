use crate::{
    entities::{
        cart, cart_item,
        order::{self, OrderStatus, PaymentStatus},
        order_item, Cart, CartItem, Order, OrderItem,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::{InventoryService, StockRef},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Order management: lookups, status transitions and cancellation.
/// Orders are never deleted; terminal states are cancelled/refunded.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: InventoryService,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        inventory: InventoryService,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<order::Model, ServiceError> {
        Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))
    }

    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    /// Customer's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_customer(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((data, total))
    }

    /// Moves an order along its lifecycle, rejecting transitions the
    /// state machine does not allow.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;
        let old_status = order.status;

        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot move order from {} to {}",
                old_status.as_str(),
                new_status.as_str()
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await;

        info!(
            %order_id,
            from = old_status.as_str(),
            to = new_status.as_str(),
            "Order status updated"
        );
        Ok(updated)
    }

    /// Cancels an unpaid, unshipped order, all in one transaction.
    ///
    /// Reserved stock is owned by the cart lines until payment clears
    /// the cart, so only quantities still sitting in the customer's cart
    /// are released here; those cart lines are consumed in the same
    /// step. Quantities the customer already removed from the cart were
    /// released at removal time.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(
                "Paid orders must be refunded, not cancelled".to_string(),
            ));
        }
        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot cancel an order in status {}",
                order.status.as_str()
            )));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        let customer_cart = Cart::find()
            .filter(cart::Column::CustomerId.eq(order.customer_id))
            .one(&txn)
            .await?;

        for item in &items {
            let Some(cart) = &customer_cart else { break };

            let cart_line = CartItem::find()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .filter(cart_item::Column::ProductId.eq(item.product_id))
                .filter(match item.variant_id {
                    Some(id) => cart_item::Column::VariantId.eq(id),
                    None => cart_item::Column::VariantId.is_null(),
                })
                .one(&txn)
                .await?;

            let Some(cart_line) = cart_line else { continue };

            let stock = match item.variant_id {
                Some(variant_id) => StockRef::Variant {
                    product_id: item.product_id,
                    variant_id,
                },
                None => StockRef::Product(item.product_id),
            };

            let release_qty = item.quantity.min(cart_line.quantity);
            self.inventory.release(&txn, stock, release_qty).await?;

            if cart_line.quantity > release_qty {
                let remaining = cart_line.quantity - release_qty;
                let mut active: cart_item::ActiveModel = cart_line.into();
                active.quantity = Set(remaining);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await?;
            } else {
                CartItem::delete_by_id(cart_line.id).exec(&txn).await?;
            }
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;

        info!(%order_id, "Order cancelled, stock released");
        Ok(updated)
    }
}
