use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::errors::{BotError, Result};
use crate::common::types::{PositionSide, SymbolFilters};
use crate::config::types::{CallbackStep, PartialExit, TrailingConfig};
use crate::risk::VolatilityRegime;
use crate::sltp::round_stop;

/// Lifecycle phase of a trailing stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrailingPhase {
    #[default]
    Inactive,
    Armed,
    Trailing,
    Triggered,
}

/// Persisted trailing state of one position
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrailingState {
    pub phase: TrailingPhase,
    pub active: bool,
    /// Best price since activation (highest for longs, lowest for shorts)
    pub extreme_price: Option<Decimal>,
    /// Price at which the stop armed
    pub activation_price: Option<Decimal>,
    /// Callback currently applied to the extreme
    pub callback_pct: Decimal,
    /// Current trailing stop level
    pub stop_price: Option<Decimal>,
    /// Last accepted price, used for the sanity filter
    pub last_price: Option<Decimal>,
    #[serde(default)]
    pub last_price_at: Option<DateTime<Utc>>,
    /// Last out-of-band price; a following price near it is accepted
    #[serde(default)]
    pub pending_price: Option<Decimal>,
    /// Profit thresholds of partial exits that already fired
    #[serde(default)]
    pub fired_partials: Vec<Decimal>,
    #[serde(default)]
    pub regime: Option<VolatilityRegime>,
    #[serde(default)]
    pub armed_at: Option<DateTime<Utc>>,
}

impl TrailingState {
    pub fn is_terminal(&self) -> bool {
        self.phase == TrailingPhase::Triggered
    }

    pub fn partial_fired(&self, threshold: Decimal) -> bool {
        self.fired_partials.contains(&threshold)
    }
}

/// Outcome of one price observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrailingEvent {
    Armed {
        extreme: Decimal,
        stop: Decimal,
    },
    StopTightened {
        from: Decimal,
        to: Decimal,
    },
    PartialExit {
        profit_pct: Decimal,
        quantity: Decimal,
    },
    Triggered {
        stop: Decimal,
        price: Decimal,
    },
}

/// Trailing parameters resolved for one volatility regime
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingParams {
    pub enabled: bool,
    pub activation_pct: Decimal,
    pub callback_pct: Decimal,
    pub callback_steps: Vec<CallbackStep>,
    pub min_profit_pct: Option<Decimal>,
    pub partial_exits: Vec<PartialExit>,
    pub max_price_deviation_pct: Decimal,
    /// A last price older than this no longer anchors the sanity band
    pub reference_max_age: Option<Duration>,
}

impl TrailingParams {
    /// Base parameters with the regime override applied
    pub fn for_regime(config: &TrailingConfig, regime: Option<VolatilityRegime>) -> Self {
        let overrides = match regime {
            Some(VolatilityRegime::Low) => config.regimes.low.as_ref(),
            Some(VolatilityRegime::Normal) => config.regimes.normal.as_ref(),
            Some(VolatilityRegime::High) => config.regimes.high.as_ref(),
            None => None,
        };

        let mut partial_exits = config.partial_exits.clone();
        partial_exits.sort_by(|a, b| a.profit_pct.cmp(&b.profit_pct));
        let mut callback_steps = config.callback_steps.clone();
        callback_steps.sort_by(|a, b| a.profit_pct.cmp(&b.profit_pct));

        Self {
            enabled: config.enabled,
            activation_pct: overrides.map_or(config.activation_pct, |o| o.activation_pct),
            callback_pct: overrides.map_or(config.callback_pct, |o| o.callback_pct),
            callback_steps,
            min_profit_pct: config.min_profit_pct,
            partial_exits,
            max_price_deviation_pct: config.max_price_deviation_pct,
            reference_max_age: None,
        }
    }

    pub fn with_reference_max_age(mut self, age: Duration) -> Self {
        self.reference_max_age = Some(age);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: Decimal| v > Decimal::ZERO && v < Decimal::ONE;
        if !in_unit(self.activation_pct) {
            return Err(BotError::Configuration(format!(
                "activation_pct must be in (0, 1), got {}",
                self.activation_pct
            )));
        }
        if !in_unit(self.callback_pct) || self.callback_steps.iter().any(|s| !in_unit(s.callback_pct)) {
            return Err(BotError::Configuration("callback_pct must be in (0, 1)".into()));
        }
        if let Some(floor) = self.min_profit_pct {
            if floor < Decimal::ZERO || floor >= self.activation_pct {
                return Err(BotError::Configuration(format!(
                    "min_profit_pct {} must be in [0, activation_pct)",
                    floor
                )));
            }
        }
        if self
            .partial_exits
            .iter()
            .any(|p| p.fraction <= Decimal::ZERO || p.fraction > Decimal::ONE || p.profit_pct <= Decimal::ZERO)
        {
            return Err(BotError::Configuration(
                "partial exits need profit_pct > 0 and fraction in (0, 1]".into(),
            ));
        }
        if self.max_price_deviation_pct <= Decimal::ZERO {
            return Err(BotError::Configuration("max_price_deviation_pct must be positive".into()));
        }
        Ok(())
    }

    /// Callback for a given peak profit; the last step at or below the profit wins
    pub fn callback_for(&self, peak_profit: Decimal) -> Decimal {
        self.callback_steps
            .iter()
            .rev()
            .find(|s| peak_profit >= s.profit_pct)
            .map_or(self.callback_pct, |s| s.callback_pct)
    }
}

/// Advances [`TrailingState`] by one price observation
#[derive(Debug, Clone)]
pub struct TrailingStop {
    params: TrailingParams,
}

impl TrailingStop {
    pub fn new(params: TrailingParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &TrailingParams {
        &self.params
    }

    /// Feed one price into the state machine
    ///
    /// A rejected price returns `StaleData` and leaves phase, extreme and
    /// stop untouched. It is kept as `pending_price`, so a gap the market
    /// confirms on the next tick is accepted instead of rejected forever.
    pub fn on_price(
        &self,
        side: PositionSide,
        entry: Decimal,
        quantity: Decimal,
        state: &mut TrailingState,
        price: Decimal,
        filters: &SymbolFilters,
    ) -> Result<Vec<TrailingEvent>> {
        self.check_price(state, price, Utc::now())?;

        if state.is_terminal() {
            return Ok(Vec::new());
        }

        state.last_price = Some(price);
        state.last_price_at = Some(Utc::now());
        state.pending_price = None;
        let mut events = Vec::new();
        let profit = side.profit_pct(entry, price);

        self.partial_exits(state, profit, quantity, &mut events);

        if !self.params.enabled {
            return Ok(events);
        }

        match state.phase {
            TrailingPhase::Inactive => {
                if profit >= self.params.activation_pct {
                    let callback = self.params.callback_for(profit);
                    let stop = self.candidate_stop(side, entry, price, callback, filters);
                    state.phase = TrailingPhase::Armed;
                    state.active = true;
                    state.extreme_price = Some(price);
                    state.activation_price = Some(price);
                    state.callback_pct = callback;
                    state.stop_price = Some(stop);
                    state.armed_at = Some(Utc::now());
                    info!(%side, %entry, %price, %stop, %callback, "trailing stop armed");
                    events.push(TrailingEvent::Armed { extreme: price, stop });
                }
            }
            TrailingPhase::Armed | TrailingPhase::Trailing => {
                let extreme = state.extreme_price.unwrap_or(price);
                if side.is_improvement(price, extreme) {
                    state.extreme_price = Some(price);
                    state.phase = TrailingPhase::Trailing;

                    let callback = self.params.callback_for(side.profit_pct(entry, price));
                    state.callback_pct = callback;
                    let candidate = self.candidate_stop(side, entry, price, callback, filters);
                    match state.stop_price {
                        Some(current) if !side.is_improvement(candidate, current) => {
                            debug!(%side, %candidate, %current, "candidate stop does not tighten");
                        }
                        current => {
                            state.stop_price = Some(candidate);
                            if let Some(from) = current {
                                events.push(TrailingEvent::StopTightened { from, to: candidate });
                            }
                        }
                    }
                }

                if let Some(stop) = state.stop_price {
                    let crossed = match side {
                        PositionSide::Long => price <= stop,
                        PositionSide::Short => price >= stop,
                    };
                    if crossed {
                        state.phase = TrailingPhase::Triggered;
                        info!(%side, %price, %stop, "trailing stop triggered");
                        events.push(TrailingEvent::Triggered { stop, price });
                    }
                }
            }
            TrailingPhase::Triggered => {}
        }

        Ok(events)
    }

    fn check_price(&self, state: &mut TrailingState, price: Decimal, now: DateTime<Utc>) -> Result<()> {
        if price <= Decimal::ZERO {
            return Err(BotError::StaleData(format!("non-positive price {}", price)));
        }
        let Some(last) = self.reference_price(state, now) else {
            return Ok(());
        };

        let drift = deviation(price, last);
        if drift <= self.params.max_price_deviation_pct {
            return Ok(());
        }
        if let Some(pending) = state.pending_price {
            if deviation(price, pending) <= self.params.max_price_deviation_pct {
                info!(%price, %last, %pending, "price gap confirmed, moving sanity reference");
                return Ok(());
            }
        }

        warn!(%price, %last, deviation = %drift, "rejecting price outside sanity band");
        state.pending_price = Some(price);
        Err(BotError::StaleData(format!(
            "price {} deviates {} from last {}",
            price, drift, last
        )))
    }

    /// Last accepted price, unless it is too old to compare against
    fn reference_price(&self, state: &TrailingState, now: DateTime<Utc>) -> Option<Decimal> {
        let last = state.last_price.filter(|p| *p > Decimal::ZERO)?;
        match (self.params.reference_max_age, state.last_price_at) {
            (Some(max_age), Some(at)) if now - at > max_age => None,
            (Some(_), None) => None,
            _ => Some(last),
        }
    }

    fn partial_exits(
        &self,
        state: &mut TrailingState,
        profit: Decimal,
        quantity: Decimal,
        events: &mut Vec<TrailingEvent>,
    ) {
        let mut remaining = quantity;
        for exit in &self.params.partial_exits {
            if profit < exit.profit_pct || state.partial_fired(exit.profit_pct) {
                continue;
            }
            let qty = remaining * exit.fraction;
            state.fired_partials.push(exit.profit_pct);
            if qty > Decimal::ZERO {
                remaining -= qty;
                events.push(TrailingEvent::PartialExit {
                    profit_pct: exit.profit_pct,
                    quantity: qty,
                });
            }
        }
    }

    /// `extreme * (1 ∓ callback)`, held at the minimum-profit floor, tick-rounded
    fn candidate_stop(
        &self,
        side: PositionSide,
        entry: Decimal,
        extreme: Decimal,
        callback: Decimal,
        filters: &SymbolFilters,
    ) -> Decimal {
        let sign = side.sign();
        let mut stop = extreme * (Decimal::ONE - sign * callback);
        if let Some(floor_pct) = self.params.min_profit_pct {
            let floor = entry * (Decimal::ONE + sign * floor_pct);
            stop = match side {
                PositionSide::Long => stop.max(floor),
                PositionSide::Short => stop.min(floor),
            };
        }
        round_stop(side, stop, filters)
    }
}

fn deviation(price: Decimal, reference: Decimal) -> Decimal {
    ((price - reference) / reference).abs()
}
