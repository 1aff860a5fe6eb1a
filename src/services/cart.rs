use crate::{
    entities::{
        cart, cart_item, product, product_variant, Cart, CartItem, Product, ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::{InventoryService, StockRef},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service. Every mutation reserves or releases inventory
/// in the same transaction as the cart-item write, so stock and cart
/// contents can never drift apart.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: InventoryService,
}

impl CartService {
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

    /// Fetches the customer's cart, creating one on first use.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, customer_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let new_cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match new_cart.insert(&*self.db).await {
            Ok(created) => Ok(created),
            // A concurrent request created the cart first; the unique
            // customer_id constraint makes this safe to re-read.
            Err(insert_err) => Cart::find()
                .filter(cart::Column::CustomerId.eq(customer_id))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::DatabaseError(insert_err)),
        }
    }

    /// Adds an item to the customer's cart, reserving stock first.
    ///
    /// When the product carries variants the (size, color) pair selects
    /// one; reservation then narrows both the variant and product rows.
    /// Lines merge on (cart, product, variant).
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddToCartInput,
    ) -> Result<cart_item::Model, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let cart = self.get_or_create_cart(customer_id).await?;

        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if !product.is_active {
            return Err(ServiceError::InvalidOperation(
                "Product is not available".to_string(),
            ));
        }

        let variant = self
            .resolve_variant(&txn, &product, input.size.as_deref(), input.color.as_deref())
            .await?;

        let stock = match &variant {
            Some(v) => StockRef::Variant {
                product_id: product.id,
                variant_id: v.id,
            },
            None => StockRef::Product(product.id),
        };

        self.inventory.reserve(&txn, stock, input.quantity).await?;

        let variant_id = variant.as_ref().map(|v| v.id);
        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .filter(match variant_id {
                Some(id) => cart_item::Column::VariantId.eq(id),
                None => cart_item::Column::VariantId.is_null(),
            })
            .one(&txn)
            .await?;

        let item = match existing {
            Some(item) => {
                let current = item.quantity;
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(current + input.quantity);
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?
            }
            None => {
                let now = Utc::now();
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    variant_id: Set(variant_id),
                    quantity: Set(input.quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                item.insert(&txn).await?
            }
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: product.id,
                quantity: input.quantity,
            })
            .await;

        info!(
            cart_id = %cart.id,
            product_id = %product.id,
            quantity = input.quantity,
            "Added item to cart"
        );
        Ok(item)
    }

    /// Changes a line's quantity, re-reserving or releasing the delta.
    /// Removal is explicit (`remove_item`), so quantities below 1 are
    /// rejected here.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        new_quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        if new_quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart_id {
            return Err(ServiceError::InvalidOperation(
                "Item does not belong to this cart".to_string(),
            ));
        }

        let stock = self.stock_ref_for(&item);
        let delta = new_quantity - item.quantity;
        if delta > 0 {
            self.inventory.reserve(&txn, stock, delta).await?;
        } else if delta < 0 {
            self.inventory.release(&txn, stock, -delta).await?;
        }

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(new_quantity);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id,
                item_id,
                quantity: new_quantity,
            })
            .await;

        Ok(updated)
    }

    /// Removes a line and returns its full quantity to inventory.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart_id {
            return Err(ServiceError::InvalidOperation(
                "Item does not belong to this cart".to_string(),
            ));
        }

        let stock = self.stock_ref_for(&item);
        self.inventory.release(&txn, stock, item.quantity).await?;

        item.clone().delete(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;

        info!(%cart_id, %item_id, "Removed cart item");
        Ok(())
    }

    /// Cart contents with effective prices and the running total.
    #[instrument(skip(self))]
    pub async fn get_cart_with_items(&self, cart_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let lines = self.cart_lines(&*self.db, cart_id).await?;
        let total = lines.iter().map(|l| l.line_total).sum();

        Ok(CartWithItems { cart, lines, total })
    }

    /// Sum of effective unit price x quantity across the cart. No side
    /// effects.
    pub async fn cart_total<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        let lines = self.cart_lines(conn, cart_id).await?;
        Ok(lines.iter().map(|l| l.line_total).sum())
    }

    /// Resolved view of every line in the cart: snapshot-ready name,
    /// variant attributes and effective unit price.
    pub async fn cart_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<Vec<CartLine>, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .all(conn)
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = Product::find_by_id(item.product_id)
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            let variant = match item.variant_id {
                Some(variant_id) => ProductVariant::find_by_id(variant_id).one(conn).await?,
                None => None,
            };

            let unit_price = effective_unit_price(&product, variant.as_ref());
            let line_total = unit_price * Decimal::from(item.quantity);

            lines.push(CartLine {
                item,
                product,
                variant,
                unit_price,
                line_total,
            });
        }

        Ok(lines)
    }

    /// Deletes every line without touching stock. Called once payment is
    /// confirmed, when the reserved units are genuinely sold.
    pub async fn clear_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;
        Ok(())
    }

    fn stock_ref_for(&self, item: &cart_item::Model) -> StockRef {
        match item.variant_id {
            Some(variant_id) => StockRef::Variant {
                product_id: item.product_id,
                variant_id,
            },
            None => StockRef::Product(item.product_id),
        }
    }

    async fn resolve_variant<C: ConnectionTrait>(
        &self,
        conn: &C,
        product: &product::Model,
        size: Option<&str>,
        color: Option<&str>,
    ) -> Result<Option<product_variant::Model>, ServiceError> {
        if !product.has_variants {
            return Ok(None);
        }

        let mut query =
            ProductVariant::find().filter(product_variant::Column::ProductId.eq(product.id));
        if let Some(size) = size {
            query = query.filter(product_variant::Column::Size.eq(size));
        }
        if let Some(color) = color {
            query = query.filter(product_variant::Column::Color.eq(color));
        }

        query
            .one(conn)
            .await?
            .map(Some)
            .ok_or_else(|| {
                ServiceError::ValidationError("No matching variant for this product".to_string())
            })
    }
}

/// Effective unit price: the variant override when present, else the
/// product's discounted selling price.
pub fn effective_unit_price(
    product: &product::Model,
    variant: Option<&product_variant::Model>,
) -> Decimal {
    variant
        .and_then(|v| v.price)
        .unwrap_or_else(|| product.selling_price())
}

/// Input for adding an item to the cart
#[derive(Debug, Clone, Deserialize)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub size: Option<String>,
    pub color: Option<String>,
}

/// One resolved cart line
#[derive(Debug, Serialize)]
pub struct CartLine {
    pub item: cart_item::Model,
    pub product: product::Model,
    pub variant: Option<product_variant::Model>,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Cart with resolved lines and total
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: cart::Model,
    pub lines: Vec<CartLine>,
    pub total: Decimal,
}
