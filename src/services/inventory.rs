use crate::{
    entities::{product, product_variant, Product, ProductVariant},
    errors::ServiceError,
};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Identifies the stock row(s) a reservation acts on. Reserving a
/// variant narrows both the variant row and its parent product row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockRef {
    Product(Uuid),
    Variant { product_id: Uuid, variant_id: Uuid },
}

impl StockRef {
    pub fn product_id(&self) -> Uuid {
        match *self {
            StockRef::Product(id) => id,
            StockRef::Variant { product_id, .. } => product_id,
        }
    }

    pub fn variant_id(&self) -> Option<Uuid> {
        match *self {
            StockRef::Product(_) => None,
            StockRef::Variant { variant_id, .. } => Some(variant_id),
        }
    }
}

/// Inventory ledger. Stock checks and adjustments are single conditional
/// UPDATE statements (`SET quantity = quantity - n WHERE quantity >= n`)
/// so two concurrent writers against the same row can never both
/// succeed past the stock limit. `reserve` and `release` run on the
/// caller's connection and are expected to share a transaction with the
/// cart/order write that consumes them.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Atomically decrements available stock, failing with
    /// `InsufficientStock` when fewer than `quantity` units remain.
    #[instrument(skip(self, conn))]
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
        stock: StockRef,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        if let StockRef::Variant { variant_id, .. } = stock {
            let result = ProductVariant::update_many()
                .col_expr(
                    product_variant::Column::Stock,
                    Expr::col(product_variant::Column::Stock).sub(quantity),
                )
                .filter(product_variant::Column::Id.eq(variant_id))
                .filter(product_variant::Column::Stock.gte(quantity))
                .exec(conn)
                .await?;

            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "Not enough stock for variant {}",
                    variant_id
                )));
            }
        }

        let product_id = stock.product_id();
        let result = Product::update_many()
            .col_expr(
                product::Column::Quantity,
                Expr::col(product::Column::Quantity).sub(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Quantity.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            // Rolls back the variant decrement together with the rest of
            // the caller's transaction.
            return Err(ServiceError::InsufficientStock(format!(
                "Not enough stock for product {}",
                product_id
            )));
        }

        Ok(())
    }

    /// Atomically returns stock to the ledger. Used when a cart item is
    /// removed or reduced, and when an unpaid order is cancelled.
    #[instrument(skip(self, conn))]
    pub async fn release<C: ConnectionTrait>(
        &self,
        conn: &C,
        stock: StockRef,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        if let StockRef::Variant { variant_id, .. } = stock {
            ProductVariant::update_many()
                .col_expr(
                    product_variant::Column::Stock,
                    Expr::col(product_variant::Column::Stock).add(quantity),
                )
                .filter(product_variant::Column::Id.eq(variant_id))
                .exec(conn)
                .await?;
        }

        Product::update_many()
            .col_expr(
                product::Column::Quantity,
                Expr::col(product::Column::Quantity).add(quantity),
            )
            .filter(product::Column::Id.eq(stock.product_id()))
            .exec(conn)
            .await?;

        Ok(())
    }

    /// Units currently available for the given product or variant.
    #[instrument(skip(self))]
    pub async fn availability(&self, stock: StockRef) -> Result<i32, ServiceError> {
        match stock {
            StockRef::Product(product_id) => {
                let product = Product::find_by_id(product_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Product {} not found", product_id))
                    })?;
                Ok(product.quantity)
            }
            StockRef::Variant { variant_id, .. } => {
                let variant = ProductVariant::find_by_id(variant_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Variant {} not found", variant_id))
                    })?;
                Ok(variant.stock)
            }
        }
    }
}
