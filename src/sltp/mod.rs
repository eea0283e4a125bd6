//! Stop-loss / take-profit level calculation
//!
//! Converts an entry price, side and [`RiskProfile`] into absolute SL/TP
//! levels, either as fixed percentages of entry or as ATR multiples.
//! Levels are rounded to the tick grid in the direction that moves them
//! away from the market: a rounding step never makes a stop or target
//! easier to hit.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::errors::{BotError, Result};
use crate::common::types::{levels_are_ordered, PositionSide, SymbolFilters};
use crate::config::types::SltpConfig;
use crate::risk::RiskProfile;

/// How the distances were derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SltpMode {
    FixedPct,
    Atr,
}

/// Absolute exit levels for a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SltpLevels {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub mode: SltpMode,
}

#[derive(Debug, Clone)]
pub struct SltpCalculator {
    config: SltpConfig,
}

impl SltpCalculator {
    pub fn new(config: SltpConfig) -> Result<Self> {
        if config.min_sl_pct > config.max_sl_pct {
            return Err(BotError::Configuration(format!(
                "min_sl_pct {} exceeds max_sl_pct {}",
                config.min_sl_pct, config.max_sl_pct
            )));
        }
        if config.sl_atr_multiplier <= Decimal::ZERO || config.tp_atr_multiplier <= Decimal::ZERO {
            return Err(BotError::Configuration("ATR multipliers must be positive".into()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SltpConfig {
        &self.config
    }

    /// Compute SL/TP for an entry
    ///
    /// ATR distances are used when `atr` is given and ATR mode is enabled;
    /// otherwise the profile's fixed percentages apply.
    pub fn compute_sltp(
        &self,
        entry: Decimal,
        side: PositionSide,
        profile: &RiskProfile,
        atr: Option<Decimal>,
        filters: &SymbolFilters,
    ) -> Result<SltpLevels> {
        if entry <= Decimal::ZERO {
            return Err(BotError::InvalidPrice(format!("entry price {} is not positive", entry)));
        }

        let (sl_distance, tp_distance, mode) = match atr {
            Some(atr) if self.config.use_atr && atr > Decimal::ZERO => {
                let min_distance = entry * self.config.min_sl_pct;
                let max_distance = entry * self.config.max_sl_pct;
                let sl_distance = (atr * self.config.sl_atr_multiplier).clamp(min_distance, max_distance);
                let tp_distance = atr * self.config.tp_atr_multiplier;
                (sl_distance, tp_distance, SltpMode::Atr)
            }
            _ => (entry * profile.sl_pct, entry * profile.tp_pct, SltpMode::FixedPct),
        };

        let sign = side.sign();
        let raw_sl = entry - sign * sl_distance;
        let raw_tp = entry + sign * tp_distance;

        let stop_loss = round_stop(side, raw_sl, filters);
        let take_profit = round_target(side, raw_tp, filters);

        if stop_loss <= Decimal::ZERO || take_profit <= Decimal::ZERO {
            return Err(BotError::InvalidPrice(format!(
                "non-positive level for {} entry {}: sl={} tp={}",
                side, entry, stop_loss, take_profit
            )));
        }
        if !levels_are_ordered(side, entry, Some(stop_loss), Some(take_profit)) {
            return Err(BotError::InvalidPrice(format!(
                "{} entry {}: sl={} tp={} violate ordering",
                side, entry, stop_loss, take_profit
            )));
        }

        debug!(%side, %entry, %stop_loss, %take_profit, ?mode, "computed SL/TP");

        Ok(SltpLevels {
            stop_loss,
            take_profit,
            mode,
        })
    }
}

/// Round a stop level away from the market (down for longs, up for shorts)
pub fn round_stop(side: PositionSide, price: Decimal, filters: &SymbolFilters) -> Decimal {
    let strategy = match side {
        PositionSide::Long => RoundingStrategy::ToNegativeInfinity,
        PositionSide::Short => RoundingStrategy::ToPositiveInfinity,
    };
    filters.round_price(price, strategy)
}

/// Round a profit target away from the market (up for longs, down for shorts)
pub fn round_target(side: PositionSide, price: Decimal, filters: &SymbolFilters) -> Decimal {
    let strategy = match side {
        PositionSide::Long => RoundingStrategy::ToPositiveInfinity,
        PositionSide::Short => RoundingStrategy::ToNegativeInfinity,
    };
    filters.round_price(price, strategy)
}
