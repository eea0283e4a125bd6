//! Trait definitions for the exchange and notification collaborators

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::errors::Result;
use super::types::{Candle, ExchangePosition, OpenOrder, OrderResult, PositionMode, SymbolFilters};
use crate::feed::atr::average_true_range;
use crate::gateway::OrderParams;

/// Trait for futures exchange REST clients
///
/// This is the seam between the position manager and the exchange. The
/// Binance implementation lives in [`crate::exchange`]; tests substitute
/// in-memory fakes or mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Latest traded price for a symbol
    async fn get_price(&self, symbol: &str) -> Result<Decimal>;

    /// Recent candles for a symbol, oldest first
    async fn get_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;

    /// Average True Range over `period` candles of `interval`
    async fn get_atr(&self, symbol: &str, interval: &str, period: usize) -> Result<Decimal> {
        let candles = self.get_candles(symbol, interval, period as u32 + 1).await?;
        average_true_range(&candles, period)
    }

    /// All non-zero positions on the account
    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>>;

    /// Resting orders for a symbol
    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>>;

    /// Hedge vs one-way mode of the account
    async fn get_position_mode(&self) -> Result<PositionMode>;

    /// Submit an order
    async fn place_order(&self, params: &OrderParams) -> Result<OrderResult>;

    /// Cancel a resting order
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()>;

    /// Available margin balance in the quote asset
    async fn get_balance(&self) -> Result<Decimal>;

    /// Trading rules for a symbol
    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters>;

    /// Set the leverage used for new orders on a symbol
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Get the name of the exchange
    fn exchange_name(&self) -> &'static str;
}

/// Category of an outbound notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyCategory {
    Trade,
    StopAdjusted,
    Alert,
    System,
}

impl std::fmt::Display for NotifyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyCategory::Trade => write!(f, "TRADE"),
            NotifyCategory::StopAdjusted => write!(f, "STOP"),
            NotifyCategory::Alert => write!(f, "ALERT"),
            NotifyCategory::System => write!(f, "SYSTEM"),
        }
    }
}

/// Notification sink (Telegram or similar)
///
/// Implementations must swallow their own failures: the return value only
/// reports whether delivery succeeded and callers never branch trading logic on it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, category: NotifyCategory, message: &str) -> bool;
}
