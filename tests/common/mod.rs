//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use futures_trailing_bot::common::types::Candle;
use futures_trailing_bot::config::types::{AppConfig, BinanceConfig};
use futures_trailing_bot::{
    BotError, ExchangeClient, ExchangePosition, Notifier, NotifyCategory, OpenOrder, OrderParams,
    OrderResult, OrderType, PositionMode, PositionSide, Result, SymbolFilters,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Mutable state behind [`FakeExchange`]
#[derive(Debug, Default)]
pub struct FakeState {
    pub mode: Option<PositionMode>,
    pub balance: Decimal,
    pub prices: HashMap<String, Decimal>,
    pub positions: Vec<ExchangePosition>,
    pub open_orders: Vec<OpenOrder>,
    pub placed: Vec<OrderParams>,
    pub cancelled: Vec<u64>,
    pub leverage_calls: Vec<(String, u32)>,
    pub failing_prices: HashSet<String>,
    pub mode_queries: u32,
    pub next_order_id: u64,
}

/// In-memory exchange that enforces the position-mode rules on orders
#[derive(Debug, Default)]
pub struct FakeExchange {
    pub state: Mutex<FakeState>,
    pub filters: Option<SymbolFilters>,
}

impl FakeExchange {
    pub fn new(mode: PositionMode) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                mode: Some(mode),
                balance: dec!(1000),
                next_order_id: 1,
                ..FakeState::default()
            }),
            filters: Some(btc_filters()),
        })
    }

    pub fn set_mode(&self, mode: PositionMode) {
        self.state.lock().unwrap().mode = Some(mode);
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.state
            .lock()
            .unwrap()
            .prices
            .insert(symbol.to_string(), price);
    }

    pub fn fail_price(&self, symbol: &str, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_prices.insert(symbol.to_string());
        } else {
            state.failing_prices.remove(symbol);
        }
    }

    pub fn add_position(&self, symbol: &str, side: PositionSide, entry: Decimal, quantity: Decimal) {
        self.state.lock().unwrap().positions.push(ExchangePosition {
            symbol: symbol.to_string(),
            side,
            entry_price: entry,
            quantity,
            leverage: 10,
            mark_price: entry,
        });
    }

    pub fn remove_position(&self, symbol: &str, side: PositionSide) {
        self.state
            .lock()
            .unwrap()
            .positions
            .retain(|p| !(p.symbol == symbol && p.side == side));
    }

    pub fn placed(&self) -> Vec<OrderParams> {
        self.state.lock().unwrap().placed.clone()
    }

    pub fn open_orders_of(&self, symbol: &str) -> Vec<OpenOrder> {
        self.state
            .lock()
            .unwrap()
            .open_orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn position_quantity(&self, symbol: &str, side: PositionSide) -> Option<Decimal> {
        self.state
            .lock()
            .unwrap()
            .positions
            .iter()
            .find(|p| p.symbol == symbol && p.side == side)
            .map(|p| p.quantity)
    }

    fn check_mode(mode: PositionMode, params: &OrderParams) -> Result<()> {
        match mode {
            PositionMode::Hedge if params.position_side.is_none() => Err(BotError::rejection(
                -4061,
                "Order's position side does not match user's setting.",
            )),
            PositionMode::Hedge if params.reduce_only.is_some() => {
                Err(BotError::rejection(-1106, "Parameter 'reduceonly' sent when not required."))
            }
            PositionMode::OneWay if params.position_side.is_some() => Err(BotError::rejection(
                -4061,
                "Order's position side does not match user's setting.",
            )),
            _ => Ok(()),
        }
    }
}

/// Filters mirroring BTCUSDT with a $100 minimum notional
pub fn btc_filters() -> SymbolFilters {
    SymbolFilters {
        tick_size: dec!(0.1),
        step_size: dec!(0.001),
        min_qty: dec!(0.001),
        min_notional: dec!(100),
    }
}

#[async_trait]
impl ExchangeClient for FakeExchange {
    async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        let state = self.state.lock().unwrap();
        if state.failing_prices.contains(symbol) {
            return Err(BotError::Network("connection reset by peer".into()));
        }
        state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| BotError::InvalidResponse(format!("no ticker for {}", symbol)))
    }

    async fn get_candles(&self, symbol: &str, _interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let price = self.get_price(symbol).await?;
        let half = price * dec!(0.005);
        Ok((0..limit)
            .map(|_| Candle {
                open: price,
                high: price + half,
                low: price - half,
                close: price,
            })
            .collect())
    }

    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>> {
        Ok(self.state.lock().unwrap().positions.clone())
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        Ok(self.open_orders_of(symbol))
    }

    async fn get_position_mode(&self) -> Result<PositionMode> {
        let mut state = self.state.lock().unwrap();
        state.mode_queries += 1;
        state
            .mode
            .ok_or_else(|| BotError::Network("mode endpoint unavailable".into()))
    }

    async fn place_order(&self, params: &OrderParams) -> Result<OrderResult> {
        let mut state = self.state.lock().unwrap();
        let mode = state.mode.unwrap_or(PositionMode::OneWay);
        Self::check_mode(mode, params)?;

        let order_id = state.next_order_id;
        state.next_order_id += 1;
        state.placed.push(params.clone());

        let price = state.prices.get(&params.symbol).copied().unwrap_or_default();
        let side = params.position_side.unwrap_or_else(|| {
            if params.side == futures_trailing_bot::OrderSide::Buy {
                PositionSide::Long
            } else {
                PositionSide::Short
            }
        });

        match params.order_type {
            OrderType::StopMarket | OrderType::TakeProfitMarket => {
                let position_side = match mode {
                    PositionMode::Hedge => params.position_side,
                    PositionMode::OneWay => None,
                };
                state.open_orders.push(OpenOrder {
                    order_id,
                    symbol: params.symbol.clone(),
                    side: params.side,
                    position_side,
                    order_type: params.order_type,
                    price: Decimal::ZERO,
                    stop_price: params.stop_price.unwrap_or_default(),
                    quantity: params.quantity,
                    reduce_only: params.reduce_only.unwrap_or(false),
                    close_position: false,
                });
                return Ok(OrderResult {
                    order_id,
                    client_order_id: params.client_order_id.clone(),
                    symbol: params.symbol.clone(),
                    status: "NEW".into(),
                    executed_qty: Decimal::ZERO,
                    avg_price: Decimal::ZERO,
                });
            }
            _ => {}
        }

        let closing = params.reduce_only == Some(true)
            || (mode == PositionMode::Hedge
                && params.position_side.map(|s| s.exit_order_side()) == Some(params.side));
        let held_side = if closing && mode == PositionMode::OneWay {
            // a one-way close trades against the held side
            if side == PositionSide::Long { PositionSide::Short } else { PositionSide::Long }
        } else {
            side
        };

        if closing {
            if let Some(idx) = state
                .positions
                .iter()
                .position(|p| p.symbol == params.symbol && p.side == held_side)
            {
                let remaining = state.positions[idx].quantity - params.quantity;
                if remaining <= Decimal::ZERO {
                    state.positions.remove(idx);
                } else {
                    state.positions[idx].quantity = remaining;
                }
            }
        } else if params.order_type == OrderType::Market {
            state.positions.push(ExchangePosition {
                symbol: params.symbol.clone(),
                side: held_side,
                entry_price: price,
                quantity: params.quantity,
                leverage: 10,
                mark_price: price,
            });
        }

        let executed = if params.order_type == OrderType::Market {
            params.quantity
        } else {
            Decimal::ZERO
        };
        Ok(OrderResult {
            order_id,
            client_order_id: params.client_order_id.clone(),
            symbol: params.symbol.clone(),
            status: if executed.is_zero() { "NEW".into() } else { "FILLED".into() },
            executed_qty: executed,
            avg_price: if executed.is_zero() { Decimal::ZERO } else { price },
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.open_orders.len();
        state.open_orders.retain(|o| o.order_id != order_id);
        if state.open_orders.len() == before {
            return Err(BotError::rejection(-2011, "Unknown order sent."));
        }
        state.cancelled.push(order_id);
        Ok(())
    }

    async fn get_balance(&self) -> Result<Decimal> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn get_symbol_filters(&self, _symbol: &str) -> Result<SymbolFilters> {
        Ok(self.filters.unwrap_or_default())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .leverage_calls
            .push((symbol.to_string(), leverage));
        Ok(())
    }

    fn exchange_name(&self) -> &'static str {
        "fake"
    }
}

/// Notifier that records every message
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(NotifyCategory, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, category: NotifyCategory) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == category)
            .count()
    }

    pub fn messages(&self, category: NotifyCategory) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, category: NotifyCategory, message: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .push((category, message.to_string()));
        true
    }
}

/// Config with a 2% activation / 1% callback trailing stop and fast retries
pub fn test_config(state_file: &Path) -> AppConfig {
    let mut config = AppConfig {
        binance: BinanceConfig {
            api_key: Some("key".into()),
            api_secret: Some("secret".into()),
            ..BinanceConfig::default()
        },
        ..AppConfig::default()
    };
    config.settings.state_file = state_file.to_string_lossy().into_owned();
    config.settings.retry_backoff_ms = 1;
    config.settings.poll_interval_seconds = 1;
    config.trailing.activation_pct = dec!(0.02);
    config.trailing.callback_pct = dec!(0.01);
    config
}

/// Sample Binance REST payloads
pub mod binance_responses {
    pub const TICKER: &str = r#"{"symbol":"BTCUSDT","price":"50123.40","time":1589437530011}"#;

    pub const DUAL_SIDE_TRUE: &str = r#"{"dualSidePosition":true}"#;

    pub const POSITION_RISK: &str = r#"[
        {"symbol":"BTCUSDT","positionAmt":"0.010","entryPrice":"50000.0","markPrice":"50100.0","unRealizedProfit":"1.0","liquidationPrice":"45000","leverage":"10","marginType":"cross","positionSide":"LONG"},
        {"symbol":"BTCUSDT","positionAmt":"0.000","entryPrice":"0.0","markPrice":"50100.0","unRealizedProfit":"0.0","liquidationPrice":"0","leverage":"10","marginType":"cross","positionSide":"SHORT"}
    ]"#;

    pub const ORDER_ACK: &str = r#"{"orderId":22542179,"clientOrderId":"ftb-close-1","symbol":"BTCUSDT","status":"FILLED","executedQty":"0.010","avgPrice":"50120.5","side":"SELL","positionSide":"LONG","type":"MARKET"}"#;

    pub const BALANCE: &str = r#"[
        {"accountAlias":"SgsR","asset":"BNB","balance":"0.5","crossWalletBalance":"0.5","availableBalance":"0.5"},
        {"accountAlias":"SgsR","asset":"USDT","balance":"1200.00","crossWalletBalance":"1200.00","availableBalance":"1100.50"}
    ]"#;

    pub const POSITION_SIDE_ERROR: &str =
        r#"{"code":-4061,"msg":"Order's position side does not match user's setting."}"#;
}
