use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer shipping/billing address. Orders keep a foreign key to the
/// address rows they were placed with, so rows referenced by an order
/// must not be deleted (enforced by a restrict FK in the migration).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "addresses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub street_address: String,
    pub apartment: Option<String>,
    pub city: String,
    pub county: String,
    pub postal_code: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn recipient_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
