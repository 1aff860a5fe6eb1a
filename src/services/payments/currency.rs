use crate::{config::CurrencyConfig, errors::ServiceError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{instrument, warn};

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: Decimal,
    fetched_at: Instant,
}

/// KES -> USD exchange rate with a TTL cache. The upstream API is hit at
/// most once per TTL window; when a refresh fails a stale rate is served
/// rather than failing the payment, as long as one was ever fetched.
pub struct ExchangeRateCache {
    http: reqwest::Client,
    rates_url: String,
    ttl: Duration,
    state: RwLock<Option<CachedRate>>,
}

impl ExchangeRateCache {
    pub fn new(config: &CurrencyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            rates_url: config.rates_url.clone(),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            state: RwLock::new(None),
        }
    }

    /// The current KES -> USD rate, refreshed when stale.
    #[instrument(skip(self))]
    pub async fn usd_rate(&self) -> Result<Decimal, ServiceError> {
        if let Some(cached) = *self.state.read().await {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.rate);
            }
        }

        let mut guard = self.state.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = *guard {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.rate);
            }
        }

        match self.fetch_rate().await {
            Ok(rate) => {
                *guard = Some(CachedRate {
                    rate,
                    fetched_at: Instant::now(),
                });
                Ok(rate)
            }
            Err(e) => match *guard {
                Some(stale) => {
                    warn!("Exchange rate refresh failed, serving stale rate: {}", e);
                    Ok(stale.rate)
                }
                None => Err(e),
            },
        }
    }

    async fn fetch_rate(&self) -> Result<Decimal, ServiceError> {
        let response: RatesResponse = self
            .http
            .get(&self.rates_url)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("Exchange rate API unreachable: {}", e))
            })?
            .error_for_status()
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("Exchange rate API error: {}", e))
            })?
            .json()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!(
                    "Invalid exchange rate response: {}",
                    e
                ))
            })?;

        let usd = response.rates.get("USD").copied().ok_or_else(|| {
            ServiceError::ExternalServiceError("Exchange rate response missing USD".to_string())
        })?;

        Decimal::from_f64_retain(usd).filter(|r| *r > Decimal::ZERO).ok_or_else(|| {
            ServiceError::ExternalServiceError(format!("Unusable USD exchange rate: {}", usd))
        })
    }
}

/// Converts a KES amount to USD at the given rate, rounded to cents.
pub fn convert_kes_to_usd(amount_kes: Decimal, rate: Decimal) -> Decimal {
    (amount_kes * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn conversion_rounds_to_cents() {
        // 1000 KES at 0.0077 = 7.70 USD
        assert_eq!(convert_kes_to_usd(dec!(1000), dec!(0.0077)), dec!(7.70));
        // 1333 KES at 0.0077 = 10.2641 -> 10.26
        assert_eq!(convert_kes_to_usd(dec!(1333), dec!(0.0077)), dec!(10.26));
        // Midpoint rounds away from zero: 650 * 0.0077 = 5.005 -> 5.01
        assert_eq!(convert_kes_to_usd(dec!(650), dec!(0.0077)), dec!(5.01));
    }

    #[test]
    fn zero_amount_converts_to_zero() {
        assert_eq!(convert_kes_to_usd(Decimal::ZERO, dec!(0.0077)), dec!(0.00));
    }
}
