//! Price and ATR feed adapter
//!
//! Thin layer over [`ExchangeClient`] that turns exchange quirks (missing
//! ticker, zero prices, short kline history) into [`BotError::StaleData`]
//! and caches ATR values between ticks.

pub mod atr;

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::common::errors::{BotError, Result};
use crate::common::traits::ExchangeClient;
use crate::config::types::SltpConfig;

#[derive(Debug, Clone, Copy)]
struct CachedAtr {
    value: Decimal,
    fetched_at: Instant,
}

/// Price/ATR source used by the position manager
pub struct PriceFeed {
    exchange: Arc<dyn ExchangeClient>,
    atr_interval: String,
    atr_period: usize,
    atr_ttl: Duration,
    atr_cache: HashMap<String, CachedAtr>,
}

impl PriceFeed {
    pub fn new(exchange: Arc<dyn ExchangeClient>, config: &SltpConfig) -> Self {
        Self {
            exchange,
            atr_interval: config.atr_interval.clone(),
            atr_period: config.atr_period,
            atr_ttl: Duration::from_secs(config.atr_cache_seconds),
            atr_cache: HashMap::new(),
        }
    }

    /// Current price, rejecting non-positive values
    #[instrument(skip(self))]
    pub async fn price(&self, symbol: &str) -> Result<Decimal> {
        let price = self.exchange.get_price(symbol).await.map_err(|e| match e {
            BotError::InvalidResponse(msg) => BotError::StaleData(msg),
            other => other,
        })?;

        if price <= Decimal::ZERO {
            warn!(symbol, %price, "feed returned non-positive price");
            return Err(BotError::StaleData(format!("{} price {} is not positive", symbol, price)));
        }
        Ok(price)
    }

    /// ATR for a symbol, served from cache while fresh
    #[instrument(skip(self))]
    pub async fn atr(&mut self, symbol: &str) -> Result<Decimal> {
        if let Some(cached) = self.atr_cache.get(symbol) {
            if cached.fetched_at.elapsed() < self.atr_ttl {
                return Ok(cached.value);
            }
        }

        let value = self
            .exchange
            .get_atr(symbol, &self.atr_interval, self.atr_period)
            .await?;
        if value <= Decimal::ZERO {
            return Err(BotError::StaleData(format!("{} ATR {} is not positive", symbol, value)));
        }

        debug!(symbol, %value, "refreshed ATR");
        self.atr_cache.insert(
            symbol.to_string(),
            CachedAtr {
                value,
                fetched_at: Instant::now(),
            },
        );
        Ok(value)
    }

    /// ATR when available; failures are logged and treated as absent
    pub async fn atr_optional(&mut self, symbol: &str) -> Option<Decimal> {
        match self.atr(symbol).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(symbol, error = %e, "ATR unavailable, falling back to fixed percentages");
                None
            }
        }
    }

    pub fn invalidate_atr(&mut self, symbol: &str) {
        self.atr_cache.remove(symbol);
    }
}
