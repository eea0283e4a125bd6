//! Binance USDⓈ-M futures integration

pub mod auth;
pub mod binance;
pub mod messages;

pub use binance::BinanceFuturesClient;
