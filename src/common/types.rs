//! Unified types used across the bot

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::trailing::TrailingState;

/// Direction of a futures position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens a position in this direction
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces or closes a position in this direction
    pub fn exit_order_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }

    /// `1` for long, `-1` for short
    pub fn sign(&self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// True when `candidate` is strictly better than `reference` for this side
    pub fn is_improvement(&self, candidate: Decimal, reference: Decimal) -> bool {
        match self {
            PositionSide::Long => candidate > reference,
            PositionSide::Short => candidate < reference,
        }
    }

    /// Unrealized profit fraction of moving from `entry` to `price`
    pub fn profit_pct(&self, entry: Decimal, price: Decimal) -> Decimal {
        if entry.is_zero() {
            return Decimal::ZERO;
        }
        (price - entry) / entry * self.sign()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PositionSide {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" | "BUY" => Ok(PositionSide::Long),
            "SHORT" | "SELL" => Ok(PositionSide::Short),
            other => Err(format!("unknown position side: {}", other)),
        }
    }
}

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account position mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionMode {
    /// Simultaneous LONG and SHORT per symbol, `positionSide` on every order
    Hedge,
    /// One net position per symbol, `reduceOnly` on closing orders
    OneWay,
}

impl PositionMode {
    pub fn from_dual_side(dual_side_position: bool) -> Self {
        if dual_side_position {
            PositionMode::Hedge
        } else {
            PositionMode::OneWay
        }
    }
}

/// Futures order types used by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    TakeProfitMarket,
    #[serde(other)]
    Other,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            OrderType::Other => "OTHER",
        }
    }
}

/// Exchange trading rules for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    /// PRICE_FILTER tickSize
    pub tick_size: Decimal,
    /// LOT_SIZE stepSize
    pub step_size: Decimal,
    /// LOT_SIZE minQty
    pub min_qty: Decimal,
    /// MIN_NOTIONAL notional
    pub min_notional: Decimal,
}

impl SymbolFilters {
    /// Round a price to the tick grid with the given strategy
    pub fn round_price(&self, price: Decimal, strategy: RoundingStrategy) -> Decimal {
        round_to_increment(price, self.tick_size, strategy)
    }

    /// Round a quantity down to the step grid
    pub fn floor_quantity(&self, qty: Decimal) -> Decimal {
        round_to_increment(qty, self.step_size, RoundingStrategy::ToZero)
    }

    /// Round a quantity up to the step grid
    pub fn ceil_quantity(&self, qty: Decimal) -> Decimal {
        round_to_increment(qty, self.step_size, RoundingStrategy::AwayFromZero)
    }

    /// Smallest step-aligned quantity meeting both min_qty and min_notional at `price`
    pub fn min_quantity_at(&self, price: Decimal) -> Decimal {
        if price <= Decimal::ZERO {
            return self.min_qty;
        }
        self.ceil_quantity(self.min_notional / price).max(self.min_qty)
    }
}

impl Default for SymbolFilters {
    fn default() -> Self {
        Self {
            tick_size: Decimal::new(1, 2),
            step_size: Decimal::new(1, 3),
            min_qty: Decimal::new(1, 3),
            min_notional: Decimal::from(5),
        }
    }
}

/// Round `value` to a multiple of `increment`
pub fn round_to_increment(value: Decimal, increment: Decimal, strategy: RoundingStrategy) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }
    let steps = (value / increment).round_dp_with_strategy(0, strategy);
    (steps * increment).normalize()
}

/// OHLC candle used for ATR
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// Position as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    /// Absolute size, always positive
    pub quantity: Decimal,
    pub leverage: u32,
    pub mark_price: Decimal,
}

/// Resting order as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    /// `None` when the exchange reports `BOTH` (one-way mode)
    pub position_side: Option<PositionSide>,
    pub order_type: OrderType,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub quantity: Decimal,
    pub reduce_only: bool,
    pub close_position: bool,
}

/// Outcome of a submitted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: u64,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub status: String,
    pub executed_qty: Decimal,
    pub avg_price: Decimal,
}

/// A tracked open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub trailing: TrailingState,
    pub leverage: u32,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, side: PositionSide, entry_price: Decimal, quantity: Decimal, leverage: u32) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entry_price,
            quantity,
            stop_loss_price: None,
            take_profit_price: None,
            trailing: TrailingState::default(),
            leverage,
            opened_at: Utc::now(),
        }
    }

    /// Key used in the position table and the state file
    pub fn key(&self) -> String {
        position_key(&self.symbol, self.side)
    }

    pub fn notional(&self) -> Decimal {
        self.quantity * self.entry_price
    }

    /// Stop level the exchange-side protective order should sit at
    ///
    /// The trailing stop replaces the initial stop loss once it is tighter.
    pub fn protective_stop(&self) -> Option<Decimal> {
        match (self.stop_loss_price, self.trailing.stop_price) {
            (Some(sl), Some(trail)) if self.trailing.active && self.side.is_improvement(trail, sl) => {
                Some(trail)
            }
            (None, Some(trail)) if self.trailing.active => Some(trail),
            (sl, _) => sl,
        }
    }

    /// Check the SL < entry < TP ordering (inverted for shorts)
    pub fn levels_are_ordered(&self) -> bool {
        levels_are_ordered(
            self.side,
            self.entry_price,
            self.stop_loss_price,
            self.take_profit_price,
        )
    }
}

pub fn position_key(symbol: &str, side: PositionSide) -> String {
    format!("{}:{}", symbol, side)
}

/// Ordering invariant shared by positions and the SL/TP calculator
pub fn levels_are_ordered(
    side: PositionSide,
    entry: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> bool {
    let sl_ok = stop_loss.map_or(true, |sl| match side {
        PositionSide::Long => sl < entry,
        PositionSide::Short => sl > entry,
    });
    let tp_ok = take_profit.map_or(true, |tp| match side {
        PositionSide::Long => tp > entry,
        PositionSide::Short => tp < entry,
    });
    sl_ok && tp_ok
}
