use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per payment attempt, written before the gateway is called so
/// a crash mid-call still leaves an audit record with the order linkage.
/// Rows are mutated only by reconciliation and the expiry sweep, never
/// deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_id: Option<Uuid>,
    pub phone_number: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    /// Provider-assigned handle: Daraja CheckoutRequestID or PayPal payment id
    pub provider_ref: Option<String>,
    /// Provider receipt: M-Pesa receipt number or PayPal sale id
    pub receipt_number: Option<String>,
    /// PayPal approval URL the payer is redirected to
    pub payment_url: Option<String>,
    pub notes: Option<String>,
    /// When the provider confirmed the result
    pub transaction_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Supported payment providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "mpesa")]
    Mpesa,
    #[sea_orm(string_value = "paypal")]
    PayPal,
}

impl PaymentMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "mpesa" => Some(PaymentMethod::Mpesa),
            "paypal" => Some(PaymentMethod::PayPal),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::PayPal => "paypal",
        }
    }
}

/// Lifecycle of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Pending attempt whose result never arrived, swept by the
    /// reconciliation job
    #[sea_orm(string_value = "expired")]
    Expired,
}
