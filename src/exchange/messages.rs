//! Binance futures REST payloads

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::errors::{BotError, Result};
use crate::common::types::{
    Candle, ExchangePosition, OpenOrder, OrderResult, OrderSide, OrderType, PositionSide,
    SymbolFilters,
};

/// Error body returned with non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

/// `/fapi/v1/ticker/price`
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// `/fapi/v1/positionSide/dual`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualSideResponse {
    pub dual_side_position: bool,
}

/// Entry of `/fapi/v2/positionRisk`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol: String,
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    #[serde(default)]
    pub mark_price: Decimal,
    pub leverage: String,
    /// `BOTH` in one-way mode, `LONG` / `SHORT` in hedge mode
    pub position_side: String,
}

impl PositionRisk {
    /// Convert to the bot's position view; `None` for flat entries
    pub fn into_position(self) -> Option<ExchangePosition> {
        if self.position_amt.is_zero() {
            return None;
        }
        let side = match self.position_side.as_str() {
            "LONG" => PositionSide::Long,
            "SHORT" => PositionSide::Short,
            _ if self.position_amt.is_sign_negative() => PositionSide::Short,
            _ => PositionSide::Long,
        };
        Some(ExchangePosition {
            symbol: self.symbol,
            side,
            entry_price: self.entry_price,
            quantity: self.position_amt.abs(),
            leverage: self.leverage.parse().unwrap_or(1),
            mark_price: self.mark_price,
        })
    }
}

/// Entry of `/fapi/v1/openOrders`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrderResponse {
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(default)]
    pub position_side: Option<String>,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub stop_price: Decimal,
    pub orig_qty: Decimal,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub close_position: bool,
}

impl From<OpenOrderResponse> for OpenOrder {
    fn from(raw: OpenOrderResponse) -> Self {
        let position_side = match raw.position_side.as_deref() {
            Some("LONG") => Some(PositionSide::Long),
            Some("SHORT") => Some(PositionSide::Short),
            _ => None,
        };
        OpenOrder {
            order_id: raw.order_id,
            symbol: raw.symbol,
            side: raw.side,
            position_side,
            order_type: raw.order_type,
            price: raw.price,
            stop_price: raw.stop_price,
            quantity: raw.orig_qty,
            reduce_only: raw.reduce_only,
            close_position: raw.close_position,
        }
    }
}

/// `/fapi/v1/order` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: u64,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
}

impl From<OrderResponse> for OrderResult {
    fn from(raw: OrderResponse) -> Self {
        OrderResult {
            order_id: raw.order_id,
            client_order_id: raw.client_order_id,
            symbol: raw.symbol,
            status: raw.status,
            executed_qty: raw.executed_qty,
            avg_price: raw.avg_price,
        }
    }
}

/// Entry of `/fapi/v2/balance`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    pub asset: String,
    pub balance: Decimal,
    pub available_balance: Decimal,
}

/// `/fapi/v1/leverage` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverageResponse {
    pub symbol: String,
    pub leverage: u32,
}

/// `/fapi/v1/exchangeInfo`
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { tick_size: Decimal },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: Decimal, min_qty: Decimal },
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional { notional: Decimal },
    #[serde(other)]
    Other,
}

impl SymbolInfo {
    /// Collapse the filter list, keeping defaults for anything missing
    pub fn to_filters(&self) -> SymbolFilters {
        let mut filters = SymbolFilters::default();
        for filter in &self.filters {
            match filter {
                SymbolFilter::Price { tick_size } => filters.tick_size = *tick_size,
                SymbolFilter::LotSize { step_size, min_qty } => {
                    filters.step_size = *step_size;
                    filters.min_qty = *min_qty;
                }
                SymbolFilter::MinNotional { notional } => filters.min_notional = *notional,
                SymbolFilter::Other => {}
            }
        }
        filters
    }
}

/// Parse a kline row `[openTime, open, high, low, close, volume, ...]`
pub fn parse_kline(row: &[serde_json::Value]) -> Result<Candle> {
    let field = |idx: usize, name: &str| -> Result<Decimal> {
        let value = row
            .get(idx)
            .ok_or_else(|| BotError::InvalidResponse(format!("kline missing {}", name)))?;
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.parse()
            .map_err(|e| BotError::InvalidResponse(format!("Invalid kline {}: {}", name, e)))
    };

    Ok(Candle {
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_risk_hedge_entry() {
        let raw = r#"{"symbol":"BTCUSDT","positionAmt":"-0.010","entryPrice":"50000.0","markPrice":"49900.5","leverage":"10","positionSide":"SHORT"}"#;
        let risk: PositionRisk = serde_json::from_str(raw).unwrap();
        let position = risk.into_position().unwrap();

        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.quantity, dec!(0.01));
        assert_eq!(position.leverage, 10);
    }

    #[test]
    fn test_position_risk_one_way_sign() {
        let raw = r#"{"symbol":"ETHUSDT","positionAmt":"-1.5","entryPrice":"3000","markPrice":"3010","leverage":"5","positionSide":"BOTH"}"#;
        let risk: PositionRisk = serde_json::from_str(raw).unwrap();
        assert_eq!(risk.into_position().unwrap().side, PositionSide::Short);
    }

    #[test]
    fn test_flat_position_is_skipped() {
        let raw = r#"{"symbol":"ETHUSDT","positionAmt":"0.000","entryPrice":"0.0","markPrice":"0","leverage":"20","positionSide":"BOTH"}"#;
        let risk: PositionRisk = serde_json::from_str(raw).unwrap();
        assert!(risk.into_position().is_none());
    }

    #[test]
    fn test_exchange_info_filters() {
        let raw = r#"{"symbols":[{"symbol":"BTCUSDT","filters":[
            {"filterType":"PRICE_FILTER","minPrice":"556.80","maxPrice":"4529764","tickSize":"0.10"},
            {"filterType":"LOT_SIZE","stepSize":"0.001","maxQty":"1000","minQty":"0.001"},
            {"filterType":"MARKET_LOT_SIZE","stepSize":"0.001","maxQty":"120","minQty":"0.001"},
            {"filterType":"MIN_NOTIONAL","notional":"100"}
        ]}]}"#;
        let info: ExchangeInfo = serde_json::from_str(raw).unwrap();
        let filters = info.symbols[0].to_filters();

        assert_eq!(filters.tick_size, dec!(0.1));
        assert_eq!(filters.step_size, dec!(0.001));
        assert_eq!(filters.min_notional, dec!(100));
    }

    #[test]
    fn test_open_order_conversion() {
        let raw = r#"{"orderId":8886774,"symbol":"BTCUSDT","side":"SELL","positionSide":"LONG","type":"STOP_MARKET","price":"0","stopPrice":"49000","origQty":"0.010","reduceOnly":false,"closePosition":false}"#;
        let order: OpenOrder = serde_json::from_str::<OpenOrderResponse>(raw).unwrap().into();

        assert_eq!(order.order_type, OrderType::StopMarket);
        assert_eq!(order.position_side, Some(PositionSide::Long));
        assert_eq!(order.stop_price, dec!(49000));
    }

    #[test]
    fn test_unknown_order_type_is_other() {
        let raw = r#"{"orderId":1,"symbol":"BTCUSDT","side":"BUY","positionSide":"BOTH","type":"TRAILING_STOP_MARKET","origQty":"1"}"#;
        let order: OpenOrder = serde_json::from_str::<OpenOrderResponse>(raw).unwrap().into();
        assert_eq!(order.order_type, OrderType::Other);
        assert_eq!(order.position_side, None);
    }

    #[test]
    fn test_parse_kline_row() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"]"#,
        )
        .unwrap();
        let candle = parse_kline(&row).unwrap();
        assert_eq!(candle.high, dec!(0.8));
        assert_eq!(candle.close, dec!(0.015771));
    }
}
