use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::intent::{build_params, meet_min_notional, OrderIntent, OrderParams};
use crate::common::errors::{BotError, Result};
use crate::common::traits::ExchangeClient;
use crate::common::types::{OpenOrder, OrderResult, OrderType, Position, PositionMode, SymbolFilters};

/// Result of reconciling protective orders with the exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionReport {
    pub kept: u32,
    pub placed: u32,
    pub cancelled: u32,
}

impl ProtectionReport {
    pub fn changed(&self) -> bool {
        self.placed > 0 || self.cancelled > 0
    }
}

/// Translates [`OrderIntent`]s into exchange orders
///
/// Owns the position-mode and symbol-filter caches. All hedge/one-way
/// branching happens in [`build_params`].
pub struct OrderGateway {
    exchange: Arc<dyn ExchangeClient>,
    position_mode: Option<PositionMode>,
    filters: HashMap<String, SymbolFilters>,
    retry_backoff: Duration,
}

impl OrderGateway {
    pub fn new(exchange: Arc<dyn ExchangeClient>, retry_backoff: Duration) -> Self {
        Self {
            exchange,
            position_mode: None,
            filters: HashMap::new(),
            retry_backoff,
        }
    }

    /// Cached account position mode, queried on first use
    pub async fn position_mode(&mut self) -> Result<PositionMode> {
        if let Some(mode) = self.position_mode {
            return Ok(mode);
        }
        let mode = self.exchange.get_position_mode().await?;
        info!(?mode, "account position mode");
        self.position_mode = Some(mode);
        Ok(mode)
    }

    pub fn invalidate_position_mode(&mut self) {
        self.position_mode = None;
    }

    /// Cached trading rules for a symbol
    pub async fn symbol_filters(&mut self, symbol: &str) -> Result<SymbolFilters> {
        if let Some(filters) = self.filters.get(symbol) {
            return Ok(*filters);
        }
        let filters = self.exchange.get_symbol_filters(symbol).await?;
        self.filters.insert(symbol.to_string(), filters);
        Ok(filters)
    }

    /// Place an intent on the exchange
    ///
    /// Transient failures are retried once after the fixed backoff.
    /// Position-side / reduce-only rejections refresh the cached mode and
    /// resubmit once; every other rejection is returned as is.
    #[instrument(skip(self), fields(symbol = intent.symbol(), kind = intent.kind()))]
    pub async fn place(&mut self, intent: &OrderIntent) -> Result<OrderResult> {
        let filters = self.symbol_filters(intent.symbol()).await?;
        let intent = self.adjust_quantity(intent, &filters);

        if let OrderIntent::OpenPosition {
            symbol,
            leverage: Some(leverage),
            ..
        } = &intent
        {
            self.exchange.set_leverage(symbol, *leverage).await?;
        }

        let mode = self.position_mode().await?;
        let params = build_params(&intent, mode, &filters)?;

        match self.submit(&params).await {
            Err(e) if e.is_retryable_rejection() => {
                warn!(error = %e, ?mode, "order rejected for mode fields, refreshing position mode");
                self.invalidate_position_mode();
                let mode = self.position_mode().await?;
                let params = build_params(&intent, mode, &filters)?;
                self.submit(&params).await
            }
            other => other,
        }
    }

    /// Cancel a resting order
    pub async fn cancel(&self, symbol: &str, order_id: u64) -> Result<()> {
        match self.exchange.cancel_order(symbol, order_id).await {
            Err(e) if e.is_transient() => {
                tokio::time::sleep(self.retry_backoff).await;
                self.exchange.cancel_order(symbol, order_id).await
            }
            other => other,
        }
    }

    /// Make sure exactly one SL and one TP order exist at the position's levels
    ///
    /// The exchange's open-order list is the source of truth: a matching
    /// order is kept, missing ones are created first, then duplicates and
    /// stale levels are cancelled.
    #[instrument(skip(self, position), fields(symbol = %position.symbol, side = %position.side))]
    pub async fn ensure_protection(&mut self, position: &Position) -> Result<ProtectionReport> {
        let filters = self.symbol_filters(&position.symbol).await?;
        let mode = self.position_mode().await?;
        let orders = self.exchange.get_open_orders(&position.symbol).await?;
        let quantity = filters.floor_quantity(position.quantity);

        let mine: Vec<&OpenOrder> = orders
            .iter()
            .filter(|o| belongs_to(o, position, mode))
            .collect();

        let mut report = ProtectionReport::default();

        let legs = [
            (
                OrderType::StopMarket,
                position
                    .protective_stop()
                    .map(|p| crate::sltp::round_stop(position.side, p, &filters)),
            ),
            (
                OrderType::TakeProfitMarket,
                position
                    .take_profit_price
                    .map(|p| crate::sltp::round_target(position.side, p, &filters)),
            ),
        ];

        for (order_type, desired) in legs {
            let existing: Vec<&&OpenOrder> = mine.iter().filter(|o| o.order_type == order_type).collect();
            let keep = desired.and_then(|level| {
                existing
                    .iter()
                    .find(|o| o.stop_price == level && (o.close_position || o.quantity == quantity))
                    .map(|o| o.order_id)
            });

            if keep.is_some() {
                report.kept += 1;
            } else if let Some(level) = desired {
                let intent = match order_type {
                    OrderType::StopMarket => OrderIntent::AdjustStopLoss {
                        symbol: position.symbol.clone(),
                        side: position.side,
                        quantity,
                        stop_price: level,
                    },
                    _ => OrderIntent::AdjustTakeProfit {
                        symbol: position.symbol.clone(),
                        side: position.side,
                        quantity,
                        take_profit_price: level,
                    },
                };
                self.place(&intent).await?;
                report.placed += 1;
            }

            for order in existing.iter().filter(|o| Some(o.order_id) != keep) {
                debug!(order_id = order.order_id, stop = %order.stop_price, "cancelling stale protective order");
                self.cancel(&position.symbol, order.order_id).await?;
                report.cancelled += 1;
            }
        }

        if report.changed() {
            info!(?report, "protective orders reconciled");
        }
        Ok(report)
    }

    async fn submit(&self, params: &OrderParams) -> Result<OrderResult> {
        match self.exchange.place_order(params).await {
            Err(e) if e.is_transient() => {
                warn!(error = %e, backoff_ms = self.retry_backoff.as_millis() as u64, "transient order failure, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                self.exchange.place_order(params).await
            }
            other => other,
        }
    }

    fn adjust_quantity(&self, intent: &OrderIntent, filters: &SymbolFilters) -> OrderIntent {
        let mut adjusted = intent.clone();
        match &mut adjusted {
            OrderIntent::OpenPosition {
                symbol,
                quantity,
                reference_price,
                limit_price,
                ..
            } => {
                let price = limit_price.unwrap_or(*reference_price);
                let (qty, raised) = meet_min_notional(*quantity, price, filters, None);
                if raised {
                    info!(
                        symbol = %symbol,
                        requested = %quantity,
                        adjusted = %qty,
                        notional = %(qty * price),
                        min_notional = %filters.min_notional,
                        "raised order quantity to minimum notional"
                    );
                }
                *quantity = qty;
            }
            OrderIntent::ClosePosition {
                symbol,
                quantity,
                position_quantity,
                reference_price,
                ..
            } => {
                if *quantity >= *position_quantity {
                    *quantity = *position_quantity;
                } else {
                    let (qty, raised) =
                        meet_min_notional(*quantity, *reference_price, filters, Some(*position_quantity));
                    if raised {
                        info!(symbol = %symbol, requested = %quantity, adjusted = %qty, "raised partial close to minimum notional");
                    }
                    *quantity = if qty.is_zero() { *position_quantity } else { qty };
                }
            }
            _ => {}
        }
        adjusted
    }
}

fn belongs_to(order: &OpenOrder, position: &Position, mode: PositionMode) -> bool {
    if order.symbol != position.symbol {
        return false;
    }
    if !matches!(order.order_type, OrderType::StopMarket | OrderType::TakeProfitMarket) {
        return false;
    }
    match mode {
        PositionMode::Hedge => order.position_side == Some(position.side),
        PositionMode::OneWay => order.side == position.side.exit_order_side(),
    }
}

/// Quantity left after a close of `closed` from `open`
pub fn remaining_quantity(open: Decimal, closed: Decimal) -> Decimal {
    (open - closed).max(Decimal::ZERO)
}
