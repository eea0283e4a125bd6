use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::errors::{BotError, Result};
use crate::config::types::{RiskBracket, RiskConfig};

/// Risk parameters for one trade, derived from the account balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub risk_pct: Decimal,
    pub leverage: u32,
    pub sl_pct: Decimal,
    pub tp_pct: Decimal,
}

impl From<&RiskBracket> for RiskProfile {
    fn from(bracket: &RiskBracket) -> Self {
        Self {
            risk_pct: bracket.risk_per_trade,
            leverage: bracket.leverage,
            sl_pct: bracket.sl_pct,
            tp_pct: bracket.tp_pct,
        }
    }
}

/// Market volatility class from ATR relative to price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

impl std::fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolatilityRegime::Low => write!(f, "low"),
            VolatilityRegime::Normal => write!(f, "normal"),
            VolatilityRegime::High => write!(f, "high"),
        }
    }
}

/// Balance-bracket lookup over an ordered risk table
///
/// The first bracket with `balance <= max_balance` wins. Balances above
/// every threshold use the last (largest) bracket.
#[derive(Debug, Clone)]
pub struct RiskResolver {
    brackets: Vec<RiskBracket>,
    low_volatility_atr_pct: Decimal,
    high_volatility_atr_pct: Decimal,
}

impl RiskResolver {
    pub fn new(brackets: Vec<RiskBracket>) -> Result<Self> {
        validate_brackets(&brackets)?;
        let defaults = RiskConfig::default();
        Ok(Self {
            brackets,
            low_volatility_atr_pct: defaults.low_volatility_atr_pct,
            high_volatility_atr_pct: defaults.high_volatility_atr_pct,
        })
    }

    pub fn from_config(config: &RiskConfig) -> Result<Self> {
        if config.low_volatility_atr_pct >= config.high_volatility_atr_pct {
            return Err(BotError::Configuration(
                "low_volatility_atr_pct must be below high_volatility_atr_pct".into(),
            ));
        }
        let mut resolver = Self::new(config.brackets.clone())?;
        resolver.low_volatility_atr_pct = config.low_volatility_atr_pct;
        resolver.high_volatility_atr_pct = config.high_volatility_atr_pct;
        Ok(resolver)
    }

    /// Resolve the risk profile for an account balance
    pub fn resolve(&self, balance: Decimal) -> Result<RiskProfile> {
        if balance <= Decimal::ZERO {
            return Err(BotError::InvalidAccountState(format!(
                "balance must be positive, got {}",
                balance
            )));
        }

        let bracket = self
            .brackets
            .iter()
            .find(|b| balance <= b.max_balance)
            .or_else(|| self.brackets.last())
            .ok_or_else(|| BotError::Configuration("risk table is empty".into()))?;

        Ok(RiskProfile::from(bracket))
    }

    /// Resolve from an optional balance, as read from account data
    pub fn resolve_optional(&self, balance: Option<Decimal>) -> Result<RiskProfile> {
        match balance {
            Some(b) => self.resolve(b),
            None => Err(BotError::InvalidAccountState("balance unavailable".into())),
        }
    }

    /// Classify volatility from ATR and price
    pub fn classify_volatility(&self, atr: Decimal, price: Decimal) -> VolatilityRegime {
        if price <= Decimal::ZERO {
            return VolatilityRegime::Normal;
        }
        let atr_pct = atr / price;
        if atr_pct <= self.low_volatility_atr_pct {
            VolatilityRegime::Low
        } else if atr_pct >= self.high_volatility_atr_pct {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Normal
        }
    }

    pub fn brackets(&self) -> &[RiskBracket] {
        &self.brackets
    }
}

fn validate_brackets(brackets: &[RiskBracket]) -> Result<()> {
    if brackets.is_empty() {
        return Err(BotError::Configuration("risk table is empty".into()));
    }

    let unit = Decimal::ZERO..Decimal::ONE;
    let mut previous: Option<Decimal> = None;
    for bracket in brackets {
        if let Some(prev) = previous {
            if bracket.max_balance <= prev {
                return Err(BotError::Configuration(format!(
                    "risk brackets must be strictly increasing: {} after {}",
                    bracket.max_balance, prev
                )));
            }
        }
        if bracket.leverage == 0 {
            return Err(BotError::Configuration(format!(
                "bracket {} has zero leverage",
                bracket.max_balance
            )));
        }
        for (name, value) in [
            ("risk_per_trade", bracket.risk_per_trade),
            ("sl_pct", bracket.sl_pct),
            ("tp_pct", bracket.tp_pct),
        ] {
            if !unit.contains(&value) || value.is_zero() {
                return Err(BotError::Configuration(format!(
                    "bracket {}: {} must be in (0, 1), got {}",
                    bracket.max_balance, name, value
                )));
            }
        }
        previous = Some(bracket.max_balance);
    }
    Ok(())
}
