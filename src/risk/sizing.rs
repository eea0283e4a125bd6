use rust_decimal::Decimal;

use super::resolver::RiskProfile;
use crate::common::errors::{BotError, Result};
use crate::common::types::{PositionSide, SymbolFilters};

/// Position size computed from a risk profile
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedSize {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Quote amount lost if the stop is hit
    pub risk_amount: Decimal,
    /// True when the leverage cap reduced the risk-based size
    pub capped_by_leverage: bool,
    /// Timestamp when this was computed
    pub computed_at: chrono::DateTime<chrono::Utc>,
}

impl ComputedSize {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }

    pub fn is_valid(&self) -> bool {
        self.quantity > Decimal::ZERO && self.price > Decimal::ZERO
    }
}

/// Size a position so that hitting `stop_loss` loses `balance * risk_pct`
///
/// The result is capped at `balance * leverage / entry` and rounded down to
/// the step size. Minimum-notional adjustment happens in the gateway.
pub fn size_position(
    symbol: &str,
    side: PositionSide,
    balance: Decimal,
    entry: Decimal,
    stop_loss: Decimal,
    profile: &RiskProfile,
    filters: &SymbolFilters,
) -> Result<ComputedSize> {
    if balance <= Decimal::ZERO {
        return Err(BotError::InvalidAccountState(format!(
            "cannot size {} with balance {}",
            symbol, balance
        )));
    }
    if entry <= Decimal::ZERO {
        return Err(BotError::InvalidPrice(format!("entry price {} for {}", entry, symbol)));
    }

    let stop_distance = (entry - stop_loss).abs();
    if stop_distance.is_zero() {
        return Err(BotError::InvalidPrice(format!(
            "stop loss {} equals entry for {}",
            stop_loss, symbol
        )));
    }

    let risk_amount = balance * profile.risk_pct;
    let risk_qty = risk_amount / stop_distance;
    let max_qty = balance * Decimal::from(profile.leverage) / entry;
    let capped_by_leverage = risk_qty > max_qty;
    let quantity = filters.floor_quantity(risk_qty.min(max_qty));

    Ok(ComputedSize {
        symbol: symbol.to_string(),
        side,
        quantity,
        price: entry,
        risk_amount,
        capped_by_leverage,
        computed_at: chrono::Utc::now(),
    })
}
