use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::health::HealthStatus;
use crate::common::errors::{BotError, Result};
use crate::common::traits::{ExchangeClient, Notifier, NotifyCategory};
use crate::common::types::{position_key, ExchangePosition, OrderResult, Position, PositionSide};
use crate::config::types::{AppConfig, TrailingConfig};
use crate::feed::PriceFeed;
use crate::gateway::{meet_min_notional, remaining_quantity, OrderGateway, OrderIntent};
use crate::risk::{size_position, RiskResolver, VolatilityRegime};
use crate::sltp::SltpCalculator;
use crate::store::{PositionStore, StateSnapshot};
use crate::trailing::{TrailingEvent, TrailingParams, TrailingStop};

/// Counters for one polling tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub adopted: usize,
    pub processed: usize,
    pub failed: usize,
    pub closed: usize,
}

/// Result of [`PositionManager::open_position`]
///
/// `position` is `None` for a resting limit order; the position is adopted
/// by reconcile once the exchange reports it filled.
#[derive(Debug, Clone)]
pub struct OpenOutcome {
    pub order: OrderResult,
    pub position: Option<Position>,
}

/// Owns the position table and drives every tracked position once per tick
pub struct PositionManager {
    exchange: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
    feed: PriceFeed,
    gateway: OrderGateway,
    resolver: RiskResolver,
    sltp: SltpCalculator,
    trailing: TrailingConfig,
    store: PositionStore,
    positions: BTreeMap<String, Position>,
    failures: HashMap<String, u32>,
    /// Keys already alerted for unusable SL/TP levels
    price_alerts: HashSet<String>,
    alert_after: u32,
    poll_interval: Duration,
    symbols: Vec<String>,
    last_tick_at: Option<DateTime<Utc>>,
    tick_count: u64,
}

impl PositionManager {
    /// Build a manager and restore the persisted position table
    ///
    /// Restored positions are provisional until the first reconcile.
    pub fn new(
        config: &AppConfig,
        exchange: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let resolver = RiskResolver::from_config(&config.risk)?;
        let sltp = SltpCalculator::new(config.sltp.clone())?;
        for regime in [
            None,
            Some(VolatilityRegime::Low),
            Some(VolatilityRegime::Normal),
            Some(VolatilityRegime::High),
        ] {
            TrailingParams::for_regime(&config.trailing, regime).validate()?;
        }

        let store = PositionStore::new(&config.settings.state_file);
        let snapshot = store.load_or_default();
        if !snapshot.active_positions.is_empty() {
            info!(
                positions = snapshot.active_positions.len(),
                "restored position table from state file"
            );
        }

        Ok(Self {
            feed: PriceFeed::new(exchange.clone(), &config.sltp),
            gateway: OrderGateway::new(
                exchange.clone(),
                Duration::from_millis(config.settings.retry_backoff_ms),
            ),
            exchange,
            notifier,
            resolver,
            sltp,
            trailing: config.trailing.clone(),
            store,
            positions: snapshot.active_positions,
            failures: HashMap::new(),
            price_alerts: HashSet::new(),
            alert_after: config.settings.alert_after_failures.max(1),
            poll_interval: Duration::from_secs(config.settings.poll_interval_seconds.max(1)),
            symbols: config.settings.symbols.clone(),
            last_tick_at: snapshot.last_tick_at,
            tick_count: snapshot.tick_count,
        })
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &str, side: PositionSide) -> Option<&Position> {
        self.positions.get(&position_key(symbol, side))
    }

    pub fn health(&self) -> HealthStatus {
        let mut failing: Vec<(String, u32)> =
            self.failures.iter().map(|(k, v)| (k.clone(), *v)).collect();
        failing.sort();
        HealthStatus {
            last_tick_at: self.last_tick_at,
            tick_count: self.tick_count,
            tracked_positions: self.positions.len(),
            failing,
        }
    }

    /// Poll until `shutdown` flips to true
    ///
    /// A tick in progress always completes before the loop exits, and the
    /// state is persisted on the way out.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            exchange = self.exchange.exchange_name(),
            "position manager started"
        );
        self.notifier
            .notify(NotifyCategory::System, "position manager started")
            .await;

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick().await;
                    debug!(?report, "tick complete");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.persist()?;
        info!(positions = self.positions.len(), "position manager stopped");
        self.notifier
            .notify(NotifyCategory::System, "position manager stopped")
            .await;
        Ok(())
    }

    /// One polling pass over every tracked position
    ///
    /// Failures are isolated per position; the state is persisted at the end
    /// regardless of individual outcomes.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        match self.reconcile().await {
            Ok(adopted) => report.adopted = adopted,
            Err(e) => warn!(error = %e, "reconcile failed, keeping last known positions"),
        }

        let keys: Vec<String> = self.positions.keys().cloned().collect();
        for key in keys {
            match self.process(&key).await {
                Ok(closed) => {
                    report.processed += 1;
                    if closed {
                        report.closed += 1;
                    }
                    self.record_success(&key).await;
                }
                Err(e) => {
                    report.failed += 1;
                    self.record_failure(&key, &e).await;
                }
            }
        }

        self.tick_count += 1;
        self.last_tick_at = Some(Utc::now());
        if let Err(e) = self.persist() {
            error!(error = %e, "failed to persist state");
        }
        report
    }

    /// Align the position table with the exchange
    ///
    /// Positions the exchange no longer reports are dropped; new ones are
    /// adopted with freshly computed SL/TP. Tracked positions keep their
    /// trailing state and take the exchange's quantity. Returns how many
    /// positions were adopted.
    #[instrument(skip(self))]
    pub async fn reconcile(&mut self) -> Result<usize> {
        let live: BTreeMap<String, ExchangePosition> = self
            .exchange
            .get_open_positions()
            .await?
            .into_iter()
            .filter(|p| self.manages(&p.symbol))
            .map(|p| (position_key(&p.symbol, p.side), p))
            .collect();

        let gone: Vec<String> = self
            .positions
            .keys()
            .filter(|k| !live.contains_key(*k))
            .cloned()
            .collect();
        for key in gone {
            if let Some(position) = self.positions.remove(&key) {
                self.failures.remove(&key);
                self.price_alerts.remove(&key);
                info!(%key, "position no longer open on exchange");
                self.notifier
                    .notify(
                        NotifyCategory::Trade,
                        &format!("{} {} closed", position.symbol, position.side),
                    )
                    .await;
            }
        }

        let mut adopted = 0;
        for (key, live_position) in live {
            match self.positions.get_mut(&key) {
                Some(tracked) => {
                    if tracked.quantity != live_position.quantity {
                        debug!(%key, from = %tracked.quantity, to = %live_position.quantity, "quantity changed on exchange");
                        tracked.quantity = live_position.quantity;
                    }
                    tracked.leverage = live_position.leverage.max(1);
                }
                None => match self.adopt(&live_position).await {
                    Ok(position) => {
                        adopted += 1;
                        self.positions.insert(key, position);
                    }
                    Err(e) => self.record_failure(&key, &e).await,
                },
            }
        }
        Ok(adopted)
    }

    /// Open a new position sized from the risk table
    ///
    /// Without `limit_price` a market order is sent and the position is
    /// tracked immediately with its SL/TP in place.
    #[instrument(skip(self))]
    pub async fn open_position(
        &mut self,
        symbol: &str,
        side: PositionSide,
        limit_price: Option<Decimal>,
    ) -> Result<OpenOutcome> {
        let key = position_key(symbol, side);
        if self.positions.contains_key(&key) {
            return Err(BotError::OrderPrecondition(format!("{} is already tracked", key)));
        }

        let balance = self.exchange.get_balance().await?;
        let profile = self.resolver.resolve(balance)?;
        let price = self.feed.price(symbol).await?;
        let entry = limit_price.unwrap_or(price);
        let filters = self.gateway.symbol_filters(symbol).await?;
        let atr = self.atr_for(symbol).await;

        let levels = self.sltp.compute_sltp(entry, side, &profile, atr, &filters)?;
        let size = size_position(symbol, side, balance, entry, levels.stop_loss, &profile, &filters)?;
        let (quantity, _) = meet_min_notional(size.quantity, entry, &filters, None);

        let order = self
            .gateway
            .place(&OrderIntent::OpenPosition {
                symbol: symbol.to_string(),
                side,
                quantity,
                reference_price: price,
                limit_price,
                leverage: Some(profile.leverage),
            })
            .await?;

        info!(
            %symbol, %side, %quantity, %entry,
            risk = %size.risk_amount, order_id = order.order_id,
            "open order placed"
        );

        if limit_price.is_some() && order.executed_qty.is_zero() {
            self.notifier
                .notify(
                    NotifyCategory::Trade,
                    &format!("{} {} limit {} @ {} placed", symbol, side, quantity, entry),
                )
                .await;
            return Ok(OpenOutcome { order, position: None });
        }

        let fill_price = if order.avg_price > Decimal::ZERO { order.avg_price } else { entry };
        let levels = if fill_price != entry {
            self.sltp.compute_sltp(fill_price, side, &profile, atr, &filters)?
        } else {
            levels
        };
        let filled = if order.executed_qty > Decimal::ZERO { order.executed_qty } else { quantity };

        let mut position = Position::new(symbol, side, fill_price, filled, profile.leverage);
        position.stop_loss_price = Some(levels.stop_loss);
        position.take_profit_price = Some(levels.take_profit);
        position.trailing.regime = atr.map(|a| self.resolver.classify_volatility(a, fill_price));

        if let Err(e) = self.gateway.ensure_protection(&position).await {
            warn!(error = %e, %key, "protective orders not placed, will retry next tick");
        }

        self.notifier
            .notify(
                NotifyCategory::Trade,
                &format!(
                    "{} {} opened {} @ {} SL {} TP {}",
                    symbol, side, filled, fill_price, levels.stop_loss, levels.take_profit
                ),
            )
            .await;

        self.positions.insert(key, position.clone());
        self.persist()?;
        Ok(OpenOutcome {
            order,
            position: Some(position),
        })
    }

    /// Process one position; returns true when it was closed
    async fn process(&mut self, key: &str) -> Result<bool> {
        let Some(mut position) = self.positions.get(key).cloned() else {
            return Ok(false);
        };

        let price = self.feed.price(&position.symbol).await?;

        if position.trailing.is_terminal() {
            // close from an earlier tick did not go through
            self.close(&position, price).await?;
            self.positions.remove(key);
            return Ok(true);
        }

        let filters = self.gateway.symbol_filters(&position.symbol).await?;
        // a sanity reference older than two ticks is dropped, e.g. after a restart
        let reference_max_age = chrono::Duration::seconds(self.poll_interval.as_secs() as i64 * 2);
        let stop = TrailingStop::new(
            TrailingParams::for_regime(&self.trailing, position.trailing.regime)
                .with_reference_max_age(reference_max_age),
        )?;
        let events = match stop.on_price(
            position.side,
            position.entry_price,
            position.quantity,
            &mut position.trailing,
            price,
            &filters,
        ) {
            Ok(events) => events,
            Err(e) => {
                // keeps the held-back price so the next tick can confirm it
                self.positions.insert(key.to_string(), position);
                return Err(e);
            }
        };

        match self.apply_events(&mut position, events, price).await {
            Ok(true) => {
                self.positions.remove(key);
                return Ok(true);
            }
            Ok(false) => {}
            Err(e) => {
                self.positions.insert(key.to_string(), position);
                return Err(e);
            }
        }

        let protection = self.gateway.ensure_protection(&position).await;
        self.positions.insert(key.to_string(), position);
        protection?;
        Ok(false)
    }

    async fn apply_events(
        &mut self,
        position: &mut Position,
        events: Vec<TrailingEvent>,
        price: Decimal,
    ) -> Result<bool> {
        for event in events {
            match event {
                TrailingEvent::PartialExit { profit_pct, quantity } => {
                    let result = self
                        .gateway
                        .place(&OrderIntent::ClosePosition {
                            symbol: position.symbol.clone(),
                            side: position.side,
                            quantity,
                            position_quantity: position.quantity,
                            reference_price: price,
                        })
                        .await?;
                    let closed = if result.executed_qty > Decimal::ZERO {
                        result.executed_qty
                    } else {
                        quantity.min(position.quantity)
                    };
                    position.quantity = remaining_quantity(position.quantity, closed);
                    info!(symbol = %position.symbol, side = %position.side, %profit_pct, %closed, remaining = %position.quantity, "partial exit");
                    self.notifier
                        .notify(
                            NotifyCategory::Trade,
                            &format!(
                                "{} {} partial exit {} at {} profit, {} left",
                                position.symbol, position.side, closed, profit_pct, position.quantity
                            ),
                        )
                        .await;
                    if position.quantity.is_zero() {
                        return Ok(true);
                    }
                }
                TrailingEvent::Armed { extreme, stop } => {
                    self.notifier
                        .notify(
                            NotifyCategory::StopAdjusted,
                            &format!(
                                "{} {} trailing armed at {}, stop {}",
                                position.symbol, position.side, extreme, stop
                            ),
                        )
                        .await;
                }
                TrailingEvent::StopTightened { from, to } => {
                    self.notifier
                        .notify(
                            NotifyCategory::StopAdjusted,
                            &format!("{} {} stop {} -> {}", position.symbol, position.side, from, to),
                        )
                        .await;
                }
                TrailingEvent::Triggered { stop, price } => {
                    info!(symbol = %position.symbol, side = %position.side, %stop, %price, "closing on trailing stop");
                    self.close(position, price).await?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn close(&mut self, position: &Position, price: Decimal) -> Result<OrderResult> {
        let result = self
            .gateway
            .place(&OrderIntent::ClosePosition {
                symbol: position.symbol.clone(),
                side: position.side,
                quantity: position.quantity,
                position_quantity: position.quantity,
                reference_price: price,
            })
            .await?;

        let pnl = position.side.profit_pct(position.entry_price, price);
        self.notifier
            .notify(
                NotifyCategory::Trade,
                &format!(
                    "{} {} closed {} @ {} ({:.2}%)",
                    position.symbol,
                    position.side,
                    position.quantity,
                    price,
                    pnl * Decimal::ONE_HUNDRED
                ),
            )
            .await;

        let mut flat = position.clone();
        flat.stop_loss_price = None;
        flat.take_profit_price = None;
        flat.trailing.active = false;
        flat.trailing.stop_price = None;
        if let Err(e) = self.gateway.ensure_protection(&flat).await {
            warn!(error = %e, key = %position.key(), "leftover protective orders not cancelled");
        }
        Ok(result)
    }

    async fn adopt(&mut self, live: &ExchangePosition) -> Result<Position> {
        let balance = self.exchange.get_balance().await?;
        let profile = self.resolver.resolve(balance)?;
        let filters = self.gateway.symbol_filters(&live.symbol).await?;
        let atr = self.atr_for(&live.symbol).await;
        let levels = self
            .sltp
            .compute_sltp(live.entry_price, live.side, &profile, atr, &filters)?;

        let mut position = Position::new(
            live.symbol.clone(),
            live.side,
            live.entry_price,
            live.quantity,
            live.leverage.max(1),
        );
        position.stop_loss_price = Some(levels.stop_loss);
        position.take_profit_price = Some(levels.take_profit);
        position.trailing.regime = atr.map(|a| self.resolver.classify_volatility(a, live.entry_price));

        info!(
            key = %position.key(), entry = %position.entry_price, quantity = %position.quantity,
            sl = %levels.stop_loss, tp = %levels.take_profit, mode = ?levels.mode,
            "adopted exchange position"
        );
        self.notifier
            .notify(
                NotifyCategory::Trade,
                &format!(
                    "tracking {} {} {} @ {}",
                    position.symbol, position.side, position.quantity, position.entry_price
                ),
            )
            .await;
        Ok(position)
    }

    async fn atr_for(&mut self, symbol: &str) -> Option<Decimal> {
        let regimes = &self.trailing.regimes;
        let wants_atr = self.sltp.config().use_atr
            || regimes.low.is_some()
            || regimes.normal.is_some()
            || regimes.high.is_some();
        if wants_atr {
            self.feed.atr_optional(symbol).await
        } else {
            None
        }
    }

    async fn record_failure(&mut self, key: &str, err: &BotError) {
        let count = {
            let count = self.failures.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        warn!(%key, error = %err, consecutive = count, "position processing failed");

        if matches!(err, BotError::InvalidPrice(_)) {
            if self.price_alerts.insert(key.to_string()) {
                self.notifier
                    .notify(
                        NotifyCategory::Alert,
                        &format!("{} skipped, no SL/TP placed: {}", key, err),
                    )
                    .await;
            }
            return;
        }
        if count == self.alert_after {
            self.notifier
                .notify(
                    NotifyCategory::Alert,
                    &format!("{} failed {} ticks in a row: {}", key, count, err),
                )
                .await;
        }
    }

    async fn record_success(&mut self, key: &str) {
        self.price_alerts.remove(key);
        if let Some(previous) = self.failures.remove(key) {
            if previous >= self.alert_after {
                self.notifier
                    .notify(
                        NotifyCategory::System,
                        &format!("{} recovered after {} failures", key, previous),
                    )
                    .await;
            }
        }
    }

    fn manages(&self, symbol: &str) -> bool {
        self.symbols.is_empty() || self.symbols.iter().any(|s| s == symbol)
    }

    fn persist(&self) -> Result<()> {
        self.store.save(&StateSnapshot {
            active_positions: self.positions.clone(),
            last_tick_at: self.last_tick_at,
            tick_count: self.tick_count,
            saved_at: None,
        })
    }
}
