use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::errors::{BotError, Result};
use crate::common::types::{OrderSide, OrderType, PositionMode, PositionSide, SymbolFilters};

/// What the bot wants to do, independent of account mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderIntent {
    OpenPosition {
        symbol: String,
        side: PositionSide,
        quantity: Decimal,
        /// Market price used for notional checks
        reference_price: Decimal,
        /// `None` for a market order
        limit_price: Option<Decimal>,
        leverage: Option<u32>,
    },
    ClosePosition {
        symbol: String,
        side: PositionSide,
        quantity: Decimal,
        /// Full open quantity; partial closes never exceed it
        position_quantity: Decimal,
        reference_price: Decimal,
    },
    AdjustStopLoss {
        symbol: String,
        side: PositionSide,
        quantity: Decimal,
        stop_price: Decimal,
    },
    AdjustTakeProfit {
        symbol: String,
        side: PositionSide,
        quantity: Decimal,
        take_profit_price: Decimal,
    },
}

impl OrderIntent {
    pub fn symbol(&self) -> &str {
        match self {
            OrderIntent::OpenPosition { symbol, .. }
            | OrderIntent::ClosePosition { symbol, .. }
            | OrderIntent::AdjustStopLoss { symbol, .. }
            | OrderIntent::AdjustTakeProfit { symbol, .. } => symbol,
        }
    }

    pub fn side(&self) -> PositionSide {
        match self {
            OrderIntent::OpenPosition { side, .. }
            | OrderIntent::ClosePosition { side, .. }
            | OrderIntent::AdjustStopLoss { side, .. }
            | OrderIntent::AdjustTakeProfit { side, .. } => *side,
        }
    }

    /// Everything except an open reduces exposure
    pub fn is_closing(&self) -> bool {
        !matches!(self, OrderIntent::OpenPosition { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrderIntent::OpenPosition { .. } => "open",
            OrderIntent::ClosePosition { .. } => "close",
            OrderIntent::AdjustStopLoss { .. } => "sl",
            OrderIntent::AdjustTakeProfit { .. } => "tp",
        }
    }
}

/// Exchange-level order parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderParams {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<String>,
    pub position_side: Option<PositionSide>,
    pub reduce_only: Option<bool>,
    pub working_type: Option<String>,
    pub client_order_id: Option<String>,
}

impl OrderParams {
    /// Query parameters in Binance naming
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("symbol", self.symbol.clone()),
            ("side", self.side.as_str().to_string()),
            ("type", self.order_type.as_str().to_string()),
            ("quantity", self.quantity.normalize().to_string()),
        ];
        if let Some(price) = self.price {
            pairs.push(("price", price.normalize().to_string()));
        }
        if let Some(stop) = self.stop_price {
            pairs.push(("stopPrice", stop.normalize().to_string()));
        }
        if let Some(tif) = &self.time_in_force {
            pairs.push(("timeInForce", tif.clone()));
        }
        if let Some(ps) = self.position_side {
            pairs.push(("positionSide", ps.as_str().to_string()));
        }
        if let Some(reduce_only) = self.reduce_only {
            pairs.push(("reduceOnly", reduce_only.to_string()));
        }
        if let Some(wt) = &self.working_type {
            pairs.push(("workingType", wt.clone()));
        }
        if let Some(id) = &self.client_order_id {
            pairs.push(("newClientOrderId", id.clone()));
        }
        pairs
    }

    /// Hard check of mode-dependent fields before anything is sent
    pub fn check_mode_fields(&self, mode: PositionMode, closing: bool) -> Result<()> {
        match mode {
            PositionMode::Hedge => {
                if self.position_side.is_none() {
                    return Err(BotError::OrderPrecondition(format!(
                        "{}: hedge mode order without positionSide",
                        self.symbol
                    )));
                }
                if self.reduce_only.is_some() {
                    return Err(BotError::OrderPrecondition(format!(
                        "{}: hedge mode order must not carry reduceOnly",
                        self.symbol
                    )));
                }
            }
            PositionMode::OneWay => {
                if self.position_side.is_some() {
                    return Err(BotError::OrderPrecondition(format!(
                        "{}: one-way mode order must not carry positionSide",
                        self.symbol
                    )));
                }
                if closing && self.reduce_only != Some(true) {
                    return Err(BotError::OrderPrecondition(format!(
                        "{}: one-way closing order without reduceOnly",
                        self.symbol
                    )));
                }
                if !closing && self.reduce_only.is_some() {
                    return Err(BotError::OrderPrecondition(format!(
                        "{}: opening order must not carry reduceOnly",
                        self.symbol
                    )));
                }
            }
        }
        if self.quantity <= Decimal::ZERO {
            return Err(BotError::OrderPrecondition(format!(
                "{}: quantity {} is not positive",
                self.symbol, self.quantity
            )));
        }
        Ok(())
    }
}

static ORDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique client order id so a retried submission cannot duplicate an order
pub fn next_client_order_id(kind: &str) -> String {
    let seq = ORDER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("ftb-{}-{}-{}", kind, chrono::Utc::now().timestamp_millis(), seq)
}

/// Raise `quantity` to the exchange floor at `price`, optionally capped
///
/// Returns the aligned quantity and whether it was raised.
pub fn meet_min_notional(
    quantity: Decimal,
    price: Decimal,
    filters: &SymbolFilters,
    cap: Option<Decimal>,
) -> (Decimal, bool) {
    let aligned = filters.floor_quantity(quantity);
    let floor = filters.min_quantity_at(price);
    if aligned >= floor {
        return (aligned, false);
    }
    let raised = match cap {
        Some(cap) => floor.min(filters.floor_quantity(cap)),
        None => floor,
    };
    (raised, raised > aligned)
}

/// Map an intent to exchange parameters for the given account mode
pub fn build_params(
    intent: &OrderIntent,
    mode: PositionMode,
    filters: &SymbolFilters,
) -> Result<OrderParams> {
    let side = intent.side();
    let closing = intent.is_closing();

    let (order_side, order_type, quantity, price, stop_price, tif, working_type) = match intent {
        OrderIntent::OpenPosition {
            quantity,
            limit_price,
            ..
        } => {
            let order_side = side.entry_order_side();
            match limit_price {
                Some(limit) => {
                    // never pay more than asked on a buy, never sell below it
                    let strategy = match order_side {
                        OrderSide::Buy => RoundingStrategy::ToNegativeInfinity,
                        OrderSide::Sell => RoundingStrategy::ToPositiveInfinity,
                    };
                    (
                        order_side,
                        OrderType::Limit,
                        *quantity,
                        Some(filters.round_price(*limit, strategy)),
                        None,
                        Some("GTC".to_string()),
                        None,
                    )
                }
                None => (order_side, OrderType::Market, *quantity, None, None, None, None),
            }
        }
        OrderIntent::ClosePosition { quantity, .. } => (
            side.exit_order_side(),
            OrderType::Market,
            filters.floor_quantity(*quantity),
            None,
            None,
            None,
            None,
        ),
        OrderIntent::AdjustStopLoss {
            quantity,
            stop_price,
            ..
        } => (
            side.exit_order_side(),
            OrderType::StopMarket,
            filters.floor_quantity(*quantity),
            None,
            Some(crate::sltp::round_stop(side, *stop_price, filters)),
            None,
            Some("MARK_PRICE".to_string()),
        ),
        OrderIntent::AdjustTakeProfit {
            quantity,
            take_profit_price,
            ..
        } => (
            side.exit_order_side(),
            OrderType::TakeProfitMarket,
            filters.floor_quantity(*quantity),
            None,
            Some(crate::sltp::round_target(side, *take_profit_price, filters)),
            None,
            Some("MARK_PRICE".to_string()),
        ),
    };

    let (position_side, reduce_only) = match mode {
        PositionMode::Hedge => (Some(side), None),
        PositionMode::OneWay if closing => (None, Some(true)),
        PositionMode::OneWay => (None, None),
    };

    let params = OrderParams {
        symbol: intent.symbol().to_string(),
        side: order_side,
        order_type,
        quantity,
        price,
        stop_price,
        time_in_force: tif,
        position_side,
        reduce_only,
        working_type,
        client_order_id: Some(next_client_order_id(intent.kind())),
    };
    params.check_mode_fields(mode, closing)?;
    Ok(params)
}
