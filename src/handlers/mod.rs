pub mod addresses;
pub mod carts;
pub mod checkout;
pub mod orders;
pub mod payments;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    services::{
        cart::CartService,
        checkout::CheckoutService,
        inventory::InventoryService,
        notifications::Notifier,
        orders::OrderService,
        payments::{
            currency::ExchangeRateCache, gateway::PaymentGateway, mpesa::MpesaGateway,
            paypal::PayPalGateway, GatewayRegistry, PaymentService,
        },
    },
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;
use uuid::Uuid;

/// Domain services shared across handlers.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: InventoryService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub payments: PaymentService,
}

impl AppServices {
    /// Wires the service graph, building the gateway registry from
    /// whichever providers are configured.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        config: Arc<AppConfig>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let inventory = InventoryService::new(db.clone());
        let cart = CartService::new(db.clone(), event_sender.clone(), inventory.clone());
        let checkout = CheckoutService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
            cart.clone(),
            notifier.clone(),
        );
        let orders = OrderService::new(db.clone(), event_sender.clone(), inventory.clone());

        let mut registry = GatewayRegistry::new();
        if let Some(mpesa) = &config.mpesa {
            let gateway = MpesaGateway::new(mpesa.clone(), config.mpesa_callback_url());
            registry.insert(gateway.method(), Arc::new(gateway) as Arc<dyn PaymentGateway>);
        }
        if let Some(paypal) = &config.paypal {
            let rates = Arc::new(ExchangeRateCache::new(&config.currency));
            let gateway = PayPalGateway::new(paypal.clone(), rates);
            registry.insert(gateway.method(), Arc::new(gateway) as Arc<dyn PaymentGateway>);
        }

        let payments = PaymentService::new(
            db,
            event_sender,
            config,
            registry,
            notifier,
            cart.clone(),
        );

        Self {
            inventory,
            cart,
            checkout,
            orders,
            payments,
        }
    }
}

/// Authenticated customer identity, carried on the `x-customer-id`
/// header. Token verification itself lives in the auth proxy in front
/// of this service.
#[derive(Debug, Clone, Copy)]
pub struct CustomerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CustomerId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-customer-id")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ServiceError::ValidationError("Missing x-customer-id header".to_string())
            })?;

        Uuid::parse_str(raw).map(CustomerId).map_err(|_| {
            ServiceError::ValidationError("Invalid x-customer-id header".to_string())
        })
    }
}
