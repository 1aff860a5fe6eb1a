// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use duka_api::{
    config::AppConfig,
    db,
    entities::{address, product, product_variant},
    events::{self, EventSender},
    handlers::AppServices,
    services::notifications::LogNotifier,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness backed by an in-memory SQLite database. The pool is
/// pinned to a single connection so every task sees the same database.
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Self::base_config()).await
    }

    pub fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
        )
    }

    pub async fn with_config(mut cfg: AppConfig) -> Self {
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let config = Arc::new(cfg);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            config.clone(),
            Arc::new(LogNotifier),
        );

        let state = AppState {
            db: db_arc,
            config,
            event_sender,
            services,
        };

        Self {
            state,
            _event_task: event_task,
        }
    }

    pub async fn seed_product(
        &self,
        title: &str,
        price: Decimal,
        discount: Decimal,
        quantity: i32,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            description: Set(format!("{} for integration tests", title)),
            price: Set(price),
            discount: Set(discount),
            quantity: Set(quantity),
            has_variants: Set(false),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_variant(
        &self,
        product: &product::Model,
        size: &str,
        color: &str,
        stock: i32,
        price: Option<Decimal>,
    ) -> product_variant::Model {
        // Flip the parent product into variant mode.
        let mut active: product::ActiveModel = product.clone().into();
        active.has_variants = Set(true);
        active
            .update(&*self.state.db)
            .await
            .expect("mark product as variant-backed");

        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            size: Set(Some(size.to_string())),
            color: Set(Some(color.to_string())),
            stock: Set(stock),
            price: Set(price),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product variant")
    }

    pub async fn seed_address(&self, customer_id: Uuid) -> address::Model {
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            first_name: Set("Wanjiku".to_string()),
            last_name: Set("Kamau".to_string()),
            street_address: Set("123 Moi Avenue".to_string()),
            apartment: Set(None),
            city: Set("Nairobi".to_string()),
            county: Set("Nairobi".to_string()),
            postal_code: Set("00100".to_string()),
            phone: Set(Some("0712345678".to_string())),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address")
    }

    /// Router with the full /api/v1 surface, for request-level tests.
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .nest("/api/v1", duka_api::api_v1_routes())
            .with_state(self.state.clone())
    }

    pub async fn reload_product(&self, id: Uuid) -> product::Model {
        use sea_orm::EntityTrait;
        duka_api::entities::Product::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
    }

    pub async fn reload_variant(&self, id: Uuid) -> product_variant::Model {
        use sea_orm::EntityTrait;
        duka_api::entities::ProductVariant::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query variant")
            .expect("variant exists")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
