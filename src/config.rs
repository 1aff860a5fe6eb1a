use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// M-Pesa (Daraja) credentials and endpoints.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct MpesaConfig {
    /// Daraja API base URL (sandbox or production)
    #[serde(default = "default_mpesa_base_url")]
    pub base_url: String,

    pub consumer_key: String,
    pub consumer_secret: String,

    /// Paybill / till number
    pub shortcode: String,

    /// Lipa-na-M-Pesa online passkey
    pub passkey: String,
}

fn default_mpesa_base_url() -> String {
    "https://sandbox.safaricom.co.ke".to_string()
}

/// PayPal REST credentials and endpoints.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PayPalConfig {
    /// REST API base URL (sandbox or live)
    #[serde(default = "default_paypal_base_url")]
    pub base_url: String,

    pub client_id: String,
    pub client_secret: String,
}

fn default_paypal_base_url() -> String {
    "https://api.sandbox.paypal.com".to_string()
}

/// Exchange-rate lookup used for KES -> USD conversion on PayPal orders.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CurrencyConfig {
    #[serde(default = "default_rates_url")]
    pub rates_url: String,

    /// How long a fetched rate stays fresh before a refresh is attempted.
    #[serde(default = "default_rate_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_rates_url() -> String {
    "https://api.exchangerate-api.com/v4/latest/KES".to_string()
}

fn default_rate_ttl_secs() -> u64 {
    6 * 3600
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            rates_url: default_rates_url(),
            cache_ttl_secs: default_rate_ttl_secs(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// VAT rate applied to order subtotals at checkout
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,

    /// Flat shipping charge per order (0 = free shipping policy)
    #[serde(default)]
    pub flat_shipping_rate: f64,

    /// Clear the customer's cart once payment is confirmed. The cart is
    /// never cleared at order creation so a failed payment initiation
    /// leaves it recoverable.
    #[serde(default = "default_true")]
    pub clear_cart_after_payment: bool,

    /// Public base URL used to build the M-Pesa callback URL
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,

    /// Pending payment attempts older than this are swept to expired
    #[serde(default = "default_payment_expiry_minutes")]
    pub payment_expiry_minutes: i64,

    /// Interval between sweep runs, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub payment_sweep_interval_secs: u64,

    pub mpesa: Option<MpesaConfig>,
    pub paypal: Option<PayPalConfig>,

    #[serde(default)]
    pub currency: CurrencyConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_tax_rate() -> f64 {
    0.16
}

fn default_true() -> bool {
    true
}

fn default_callback_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_payment_expiry_minutes() -> i64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    30 * 60
}

impl AppConfig {
    /// Minimal constructor used by tests and tools.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            tax_rate: default_tax_rate(),
            flat_shipping_rate: 0.0,
            clear_cart_after_payment: true,
            callback_base_url: default_callback_base_url(),
            payment_expiry_minutes: default_payment_expiry_minutes(),
            payment_sweep_interval_secs: default_sweep_interval_secs(),
            mpesa: None,
            paypal: None,
            currency: CurrencyConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Full URL M-Pesa should deliver STK callbacks to.
    pub fn mpesa_callback_url(&self) -> String {
        format!(
            "{}/api/v1/payments/mpesa/callback",
            self.callback_base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Load configuration from files in `config/` overlaid with `DUKA__`
/// environment variables. Gateway credentials are optional at startup;
/// a payment initiation against an unconfigured gateway fails with a
/// configuration error instead.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://duka.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("DUKA").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_checkout_policy() {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        );

        assert_eq!(cfg.tax_rate, 0.16);
        assert_eq!(cfg.flat_shipping_rate, 0.0);
        assert!(cfg.clear_cart_after_payment);
        assert_eq!(cfg.payment_expiry_minutes, 60);
        assert!(!cfg.is_production());
    }

    #[test]
    fn callback_url_joins_without_double_slash() {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        );
        cfg.callback_base_url = "https://shop.example.com/".to_string();

        assert_eq!(
            cfg.mpesa_callback_url(),
            "https://shop.example.com/api/v1/payments/mpesa/callback"
        );
    }
}
