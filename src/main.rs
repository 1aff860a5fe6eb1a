use anyhow::Context;
use duka_api::{
    api_v1_routes, config, db,
    events::{self, EventSender},
    handlers::AppServices,
    services::notifications::LogNotifier,
    AppState,
};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));
    if cfg.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(environment = %cfg.environment, "Starting duka-api");

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    if cfg.auto_migrate {
        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
    }

    let db_arc = Arc::new(pool);
    let config = Arc::new(cfg);

    let (event_tx, event_rx) = mpsc::channel(256);
    let event_sender = EventSender::new(event_tx);
    tokio::spawn(events::process_events(event_rx));

    let services = AppServices::new(
        db_arc.clone(),
        event_sender.clone(),
        config.clone(),
        Arc::new(LogNotifier),
    );

    // Reaps pending payment attempts whose provider result never arrived
    // (abandoned STK prompts, unfinished PayPal approvals).
    let sweep_service = services.payments.clone();
    let sweep_interval = config.payment_sweep_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval.max(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweep_service.expire_stale_transactions().await {
                Ok(0) => {}
                Ok(count) => info!(count, "Expired stale payment attempts"),
                Err(e) => error!(error = %e, "Payment expiry sweep failed"),
            }
        }
    });

    let state = AppState {
        db: db_arc,
        config: config.clone(),
        event_sender,
        services,
    };

    let app = Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Listening on {}", addr);
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
