//! Futures Trailing Bot Library
//!
//! Position management for Binance USDⓈ-M futures: risk-table sizing,
//! conservative SL/TP placement, an adaptive trailing stop and an order
//! gateway that hides the hedge / one-way position mode split.

pub mod common;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod feed;
pub mod gateway;
pub mod notify;
pub mod risk;
pub mod sltp;
pub mod store;
pub mod trailing;

// Re-export commonly used types
pub use common::errors::{BotError, RejectionKind, Result};
pub use common::traits::{ExchangeClient, Notifier, NotifyCategory};
pub use common::types::{
    ExchangePosition, OpenOrder, OrderResult, OrderSide, OrderType, Position, PositionMode,
    PositionSide, SymbolFilters,
};
pub use config::types::AppConfig;
pub use engine::{HealthStatus, PositionManager, TickReport};
pub use exchange::BinanceFuturesClient;
pub use gateway::{OrderGateway, OrderIntent, OrderParams};
pub use risk::{RiskProfile, RiskResolver, VolatilityRegime};
pub use sltp::{SltpCalculator, SltpLevels};
pub use trailing::{TrailingEvent, TrailingPhase, TrailingState, TrailingStop};
