//! Cycle engine.
//!
//! Owns the per-symbol state machine:
//!
//! ```text
//! Idle --start_cycle--> LevelActive(0) --fill--> LevelActive(n+1)
//!   ^                          |
//!   |      TP / reset / close-all / shutdown
//!   +------- Resolving(outcome) <-+
//! ```
//!
//! Every venue call happens with the store lock released. Anything decided
//! from a snapshot is re-validated against the same cycle id (and, for the
//! pending slot, the same order id) before it is committed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use trap_broker::{BrokerError, DynBrokerGateway, MarketFill, MarketOrderRequest, StopOrderRequest};
use trap_core::{
    order_comment, CycleOutcome, CycleRecord, OrderId, OrderSide, OrderSnapshot, PositionId,
    PositionSnapshot, Price, Size, SymbolConfig, TradingHours,
};
use trap_persistence::DynCycleSink;
use trap_telemetry::Metrics;
use uuid::Uuid;

use crate::error::{CycleError, CycleResult};
use crate::planner::CascadePlanner;
use crate::reconcile::{self, PendingStatus, Termination};
use crate::resolver::{FillResolution, FillResolver};
use crate::restart::{RestartDecision, RestartPolicy, RestartSkip};
use crate::store::{CyclePhase, CycleState, LevelBasis, PendingSlot, SymbolStateStore};

/// Local time-of-day source used for the trading window.
pub type LocalClock = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

/// Default pause before an automatic restart.
pub const DEFAULT_RESTART_DELAY_MS: u64 = 1_500;

// ============================================================================
// Settings and results
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub trading_hours: TradingHours,
    pub auto_restart: bool,
    pub restart_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            trading_hours: TradingHours::default(),
            auto_restart: true,
            restart_delay: Duration::from_millis(DEFAULT_RESTART_DELAY_MS),
        }
    }
}

/// A confirmed L0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStarted {
    pub symbol: String,
    pub side: OrderSide,
    pub position_id: PositionId,
    pub entry_price: Price,
    pub volume: Size,
}

/// What one scheduler pass did for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// No live cycle.
    Inactive,
    Unchanged,
    LevelAdvanced(u32),
    PendingCleared,
    Resolved(CycleOutcome),
}

/// Operator view of one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleStatus {
    pub symbol: String,
    pub phase: CyclePhase,
    pub cycle_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub traps: Option<u32>,
    pub l0_side: Option<OrderSide>,
    pub l0_price: Option<Price>,
    pub open_positions: usize,
    pub pending: Option<PendingSlot>,
    pub last_l0_side: Option<OrderSide>,
    pub favored_side: Option<OrderSide>,
}

impl CycleStatus {
    fn from_state(symbol: &str, state: &CycleState) -> Self {
        Self {
            symbol: symbol.to_string(),
            phase: state.phase(),
            cycle_id: state.cycle_id(),
            started_at: state.tracking.as_ref().map(|t| t.started_at),
            traps: state.tracking.as_ref().map(|t| t.traps),
            l0_side: state.l0_side,
            l0_price: state.l0_price,
            open_positions: state.positions.len(),
            pending: state.pending,
            last_l0_side: state.last_l0_side,
            favored_side: state.favored_side,
        }
    }
}

fn side_or_dash(side: Option<OrderSide>) -> String {
    side.map_or_else(|| "-".to_string(), |s| s.to_string())
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.symbol, self.phase)?;
        if let (Some(side), Some(price)) = (self.l0_side, self.l0_price) {
            write!(f, " | L0 {side} @ {price}")?;
        }
        write!(f, " | positions {}", self.open_positions)?;
        if let Some(traps) = self.traps {
            write!(f, " | traps {traps}")?;
        }
        match self.pending {
            Some(p) => write!(
                f,
                " | pending L{} {} {} @ {} (#{})",
                p.level, p.side, p.volume, p.trigger_price, p.order_id
            )?,
            None => write!(f, " | pending -")?,
        }
        write!(
            f,
            " | last L0 {} | favored {}",
            side_or_dash(self.last_l0_side),
            side_or_dash(self.favored_side)
        )
    }
}

// ============================================================================
// CycleEngine
// ============================================================================

pub struct CycleEngine {
    configs: HashMap<String, SymbolConfig>,
    gateway: DynBrokerGateway,
    sink: DynCycleSink,
    store: SymbolStateStore,
    settings: EngineSettings,
    restart: RestartPolicy,
    resolver: FillResolver,
    clock: LocalClock,
    shutdown: watch::Sender<bool>,
}

impl CycleEngine {
    /// Create a new engine over the given symbols.
    pub fn new(
        configs: Vec<SymbolConfig>,
        gateway: DynBrokerGateway,
        sink: DynCycleSink,
        settings: EngineSettings,
    ) -> Self {
        let store = SymbolStateStore::new(configs.iter().map(|c| c.symbol.as_str()));
        let configs = configs
            .into_iter()
            .map(|c| (c.symbol.clone(), c))
            .collect();
        let (shutdown, _) = watch::channel(false);
        Self {
            configs,
            gateway,
            sink,
            store,
            restart: RestartPolicy::new(settings.auto_restart),
            settings,
            resolver: FillResolver::default(),
            clock: Arc::new(|| Local::now().time()),
            shutdown,
        }
    }

    /// Replace the restart policy (e.g. with a seeded one).
    #[must_use]
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    /// Replace the local time source.
    #[must_use]
    pub fn with_clock(mut self, clock: LocalClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &SymbolStateStore {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Stop opening new cycles. A pending auto-restart delay is cut short
    /// and the restart abandoned.
    pub fn begin_shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!("Engine shutting down, no new cycles will be opened");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Configured symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.configs.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn symbol_config(&self, symbol: &str) -> CycleResult<&SymbolConfig> {
        self.configs
            .get(symbol)
            .ok_or_else(|| CycleError::UnknownSymbol(symbol.to_string()))
    }

    /// Resolve an operator-supplied name: exact symbol first, then aliases.
    pub fn resolve_symbol(&self, name: &str) -> Option<&str> {
        if let Some(config) = self.configs.get(name) {
            return Some(config.symbol.as_str());
        }
        self.configs
            .values()
            .find(|c| c.matches(name))
            .map(|c| c.symbol.as_str())
    }

    fn in_trading_hours(&self, config: &SymbolConfig) -> bool {
        self.settings
            .trading_hours
            .allows_at((self.clock)(), config.always_tradable)
    }

    pub fn status(&self, symbol: &str) -> CycleResult<CycleStatus> {
        self.symbol_config(symbol)?;
        Ok(self
            .store
            .with_state(symbol, |s| CycleStatus::from_state(symbol, s)))
    }

    pub fn status_all(&self) -> Vec<CycleStatus> {
        self.symbols()
            .iter()
            .map(|symbol| {
                self.store
                    .with_state(symbol, |s| CycleStatus::from_state(symbol, s))
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Starting
    // ------------------------------------------------------------------------

    /// Record the operator's favored direction and start a cycle whose side
    /// is drawn from the restart policy.
    pub async fn start_with_preference(
        &self,
        symbol: &str,
        favored: OrderSide,
    ) -> CycleResult<CycleStarted> {
        self.symbol_config(symbol)?;
        self.store
            .with_state_mut(symbol, |s| s.favored_side = Some(favored));
        let side = self.restart.choose_side(favored);
        info!(symbol = %symbol, favored = %favored, side = %side, "Favored direction set");
        self.start_cycle(symbol, side).await
    }

    /// Open L0 with a market order and stage the first trap.
    pub async fn start_cycle(&self, symbol: &str, side: OrderSide) -> CycleResult<CycleStarted> {
        let config = self.symbol_config(symbol)?;
        if self.is_shutting_down() {
            return Err(CycleError::ShuttingDown(symbol.to_string()));
        }
        if !self.in_trading_hours(config) {
            return Err(CycleError::OutsideTradingHours(symbol.to_string()));
        }

        let claimed = self.store.with_state_mut(symbol, |s| {
            if s.active || s.starting || s.resolving.is_some() {
                return false;
            }
            s.reset();
            s.starting = true;
            true
        });
        if !claimed {
            return Err(CycleError::AlreadyActive(symbol.to_string()));
        }

        match self.open_l0(config, side).await {
            Ok(started) => {
                if let Err(e) = self.place_next_pending(symbol).await {
                    error!(symbol = %symbol, error = %e, "Failed to stage first trap");
                }
                Ok(started)
            }
            Err(e) => {
                self.store.with_state_mut(symbol, |s| s.starting = false);
                Err(e)
            }
        }
    }

    async fn open_l0(&self, config: &SymbolConfig, side: OrderSide) -> CycleResult<CycleStarted> {
        let symbol = config.symbol.as_str();
        let spec = self.gateway.instrument_spec(symbol).await?;
        let quote = self.gateway.quote(symbol).await?;
        let planner = CascadePlanner::new(config, &spec);

        let volume = planner.initial_lot();
        if !volume.is_positive() {
            return Err(CycleError::InvalidLot(format!("{symbol}: initial lot {volume}")));
        }
        let protective = planner.protective_levels(side, quote.entry_price(side));
        let comment = order_comment(0, config.tag);

        info!(symbol = %symbol, side = %side, volume = %volume, "Opening L0");
        let fill = self
            .gateway
            .place_market_order(MarketOrderRequest {
                symbol: symbol.to_string(),
                side,
                volume,
                stop_loss: protective.stop_loss,
                take_profit: protective.take_profit,
                tag: config.tag,
                comment: comment.clone(),
            })
            .await?;

        let position = self.identify_l0(config, &fill, &comment).await?;
        let now = Utc::now();
        self.store.with_state_mut(symbol, |s| {
            s.activate(
                position.id,
                side,
                position.entry_price,
                position.volume,
                now,
            )
        });
        Metrics::cycle_started(symbol, &side.to_string());
        info!(
            symbol = %symbol,
            side = %side,
            position_id = %position.id,
            price = %position.entry_price,
            volume = %position.volume,
            "Cycle started (L0 confirmed)"
        );

        Ok(CycleStarted {
            symbol: symbol.to_string(),
            side,
            position_id: position.id,
            entry_price: position.entry_price,
            volume: position.volume,
        })
    }

    /// Find the position opened by the L0 market order: the fill's own link,
    /// then its trades, then the newest position carrying the L0 comment.
    async fn identify_l0(
        &self,
        config: &SymbolConfig,
        fill: &MarketFill,
        comment: &str,
    ) -> CycleResult<PositionSnapshot> {
        let symbol = config.symbol.as_str();
        let mut linked = fill.position_id;
        if linked.is_none() {
            let mut trades = self.gateway.order_trades(fill.order_id).await?;
            trades.sort_by(|a, b| b.executed_at_ms.cmp(&a.executed_at_ms));
            linked = trades.iter().find_map(|t| t.position_id);
        }

        for attempt in 0..2 {
            if attempt > 0 {
                self.gateway.await_fill_propagation().await;
            }
            let positions = self.gateway.open_positions(symbol, config.tag).await?;
            let found = match linked {
                Some(id) => positions.into_iter().find(|p| p.id == id),
                None => positions
                    .into_iter()
                    .filter(|p| p.comment == comment)
                    .max_by_key(|p| p.opened_at_ms),
            };
            if let Some(position) = found {
                return Ok(position);
            }
        }

        error!(
            symbol = %symbol,
            order_id = %fill.order_id,
            linked = ?linked,
            "L0 filled but its position could not be identified"
        );
        Err(CycleError::IdentificationAmbiguous(format!(
            "{symbol}: no position for L0 order {}",
            fill.order_id
        )))
    }

    // ------------------------------------------------------------------------
    // Cascade
    // ------------------------------------------------------------------------

    /// Stage the next trap, if the cycle can take one.
    ///
    /// Returns `None` when nothing was placed: no live cycle, a pending
    /// order already exists, the level cap is reached, or the cycle changed
    /// while the order was in flight (the new order is then cancelled).
    pub async fn place_next_pending(&self, symbol: &str) -> CycleResult<Option<OrderId>> {
        let config = self.symbol_config(symbol)?;
        let max_levels = config.max_levels as usize;
        let plan_input = self.store.with_state(symbol, |s| {
            if !s.active || s.resolving.is_some() || s.pending.is_some() {
                return None;
            }
            if s.positions.len() >= max_levels {
                return None;
            }
            Some((
                s.cycle_id()?,
                s.l0_price?,
                s.l0_side?,
                s.last_basis?,
                s.current_level + 1,
            ))
        });
        let Some((cycle_id, l0_price, l0_side, basis, level)) = plan_input else {
            debug!(symbol = %symbol, "No trap to stage");
            return Ok(None);
        };

        let spec = self.gateway.instrument_spec(symbol).await?;
        let quote = self.gateway.quote(symbol).await?;
        let planner = CascadePlanner::new(config, &spec);
        let plan = planner.plan_next(level, l0_price, l0_side, basis);
        let trigger_price = planner.enforce_stop_distance(plan.side, plan.trigger_price, &quote);
        if trigger_price != plan.trigger_price {
            debug!(
                symbol = %symbol,
                planned = %plan.trigger_price,
                adjusted = %trigger_price,
                "Trap price moved to honour minimum stop distance"
            );
        }
        let protective = planner.protective_levels(plan.side, trigger_price);

        let order_id = self
            .gateway
            .place_stop_order(StopOrderRequest {
                symbol: symbol.to_string(),
                side: plan.side,
                volume: plan.volume,
                trigger_price,
                stop_loss: protective.stop_loss,
                take_profit: protective.take_profit,
                tag: config.tag,
                comment: order_comment(level, config.tag),
            })
            .await?;

        let slot = PendingSlot {
            order_id,
            side: plan.side,
            volume: plan.volume,
            trigger_price,
            level,
        };
        let committed = self.store.with_state_mut(symbol, |s| {
            if !s.is_live_cycle(cycle_id) {
                return Err("cycle no longer active");
            }
            if s.pending.is_some() {
                return Err("another pending order is tracked");
            }
            s.pending = Some(slot);
            Ok(())
        });

        match committed {
            Ok(()) => {
                Metrics::pending_placed(symbol);
                info!(
                    symbol = %symbol,
                    level,
                    side = %plan.side,
                    volume = %plan.volume,
                    price = %trigger_price,
                    order_id = %order_id,
                    "Trap staged"
                );
                Ok(Some(order_id))
            }
            Err(reason) => {
                warn!(symbol = %symbol, order_id = %order_id, reason, "Cancelling freshly placed trap");
                self.cancel_quietly(symbol, order_id).await;
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Scheduler pass
    // ------------------------------------------------------------------------

    /// Reconcile one symbol against the venue and advance its cycle.
    pub async fn process_symbol(&self, symbol: &str) -> CycleResult<PassOutcome> {
        let config = self.symbol_config(symbol)?;
        let Some(cycle_id) = self.store.with_state(symbol, |s| {
            if s.active && s.resolving.is_none() {
                s.cycle_id()
            } else {
                None
            }
        }) else {
            return Ok(PassOutcome::Inactive);
        };

        let venue_positions = self.gateway.open_positions(symbol, config.tag).await?;
        let pruned = self.store.with_state_mut(symbol, |s| {
            if !s.is_live_cycle(cycle_id) {
                return None;
            }
            let before = s.positions.len();
            s.positions = reconcile::prune(&s.positions, &venue_positions);
            Some((before - s.positions.len(), s.positions.clone(), s.pending))
        });
        let Some((dropped, tracked, pending)) = pruned else {
            return Ok(PassOutcome::Inactive);
        };
        if dropped > 0 {
            info!(
                symbol = %symbol,
                dropped,
                remaining = tracked.len(),
                "Tracked positions closed at venue"
            );
        }

        if let Some(termination) = reconcile::termination(tracked.len(), pending.is_some()) {
            let (outcome, sweep) = match termination {
                Termination::Reset => (CycleOutcome::ConcludedByReset, false),
                Termination::CloseAllSweep => (CycleOutcome::ManualCloseAll, true),
            };
            info!(symbol = %symbol, ?termination, "Cycle ended at venue");
            return Ok(self
                .resolve(config, Some(cycle_id), outcome, sweep)
                .await
                .map_or(PassOutcome::Unchanged, PassOutcome::Resolved));
        }

        let quote = self.gateway.quote(symbol).await?;
        if let Some(winner) = venue_positions
            .iter()
            .filter(|p| tracked.contains(&p.id))
            .find(|p| p.take_profit_hit(&quote))
        {
            info!(
                symbol = %symbol,
                position_id = %winner.id,
                take_profit = %winner.take_profit,
                bid = %quote.bid,
                ask = %quote.ask,
                "Take-profit crossed"
            );
            return Ok(self
                .resolve(config, Some(cycle_id), CycleOutcome::Win, true)
                .await
                .map_or(PassOutcome::Unchanged, PassOutcome::Resolved));
        }

        let Some(slot) = pending else {
            return Ok(PassOutcome::Unchanged);
        };
        let history = self.gateway.order_history(slot.order_id).await?;
        let live_orders = if history.is_none() {
            self.gateway.pending_orders(symbol, config.tag).await?
        } else {
            Vec::new()
        };

        match reconcile::classify_pending(slot.order_id, history, &live_orders) {
            PendingStatus::Live => Ok(PassOutcome::Unchanged),
            PendingStatus::Dead(state) => {
                info!(symbol = %symbol, order_id = %slot.order_id, %state, "Pending order ended without fill");
                Ok(self.clear_pending(symbol, cycle_id, slot.order_id))
            }
            PendingStatus::Ghost => {
                info!(symbol = %symbol, order_id = %slot.order_id, "Pending order unknown to venue, clearing");
                Ok(self.clear_pending(symbol, cycle_id, slot.order_id))
            }
            PendingStatus::Filled(order) => self.confirm_fill(config, cycle_id, slot, order).await,
        }
    }

    fn clear_pending(&self, symbol: &str, cycle_id: Uuid, order_id: OrderId) -> PassOutcome {
        let cleared = self
            .store
            .with_state_mut(symbol, |s| s.is_live_cycle(cycle_id) && s.clear_pending_if(order_id));
        if cleared {
            PassOutcome::PendingCleared
        } else {
            PassOutcome::Unchanged
        }
    }

    async fn confirm_fill(
        &self,
        config: &SymbolConfig,
        cycle_id: Uuid,
        slot: PendingSlot,
        order: OrderSnapshot,
    ) -> CycleResult<PassOutcome> {
        let symbol = config.symbol.as_str();
        self.gateway.await_fill_propagation().await;
        let positions = self.gateway.open_positions(symbol, config.tag).await?;
        let trades = self.gateway.order_trades(slot.order_id).await?;

        let Some(tracked) = self.store.with_state(symbol, |s| {
            let same_slot = s.pending.map(|p| p.order_id) == Some(slot.order_id);
            (s.is_live_cycle(cycle_id) && same_slot).then(|| s.positions.clone())
        }) else {
            debug!(symbol = %symbol, order_id = %slot.order_id, "Cycle changed during fill confirmation");
            return Ok(PassOutcome::Unchanged);
        };

        match self.resolver.resolve(&order, &trades, &positions, &tracked) {
            FillResolution::Identified { position, via } => {
                let basis = LevelBasis {
                    side: position.side,
                    volume: position.volume,
                };
                let committed = self.store.with_state_mut(symbol, |s| {
                    if !s.is_live_cycle(cycle_id) || !s.clear_pending_if(slot.order_id) {
                        return None;
                    }
                    Some((s.advance_level(position.id, basis), s.positions.len()))
                });
                let Some((level, open)) = committed else {
                    return Ok(PassOutcome::Unchanged);
                };

                Metrics::level_confirmed(symbol, level);
                info!(
                    symbol = %symbol,
                    level,
                    position_id = %position.id,
                    side = %position.side,
                    volume = %position.volume,
                    price = %position.entry_price,
                    via = %via,
                    "Level confirmed"
                );

                if open < config.max_levels as usize {
                    if let Err(e) = self.place_next_pending(symbol).await {
                        error!(symbol = %symbol, level, error = %e, "Failed to stage next trap");
                    }
                } else {
                    info!(symbol = %symbol, open, "Maximum levels reached, no further traps");
                }
                Ok(PassOutcome::LevelAdvanced(level))
            }
            FillResolution::Ambiguous { candidates } => {
                error!(
                    symbol = %symbol,
                    order_id = %slot.order_id,
                    ?candidates,
                    ?tracked,
                    "Filled trap matches no single new position"
                );
                Metrics::fill_unidentified(symbol, "ambiguous");
                Ok(self.clear_pending(symbol, cycle_id, slot.order_id))
            }
            FillResolution::NotFound => {
                error!(
                    symbol = %symbol,
                    order = ?order,
                    trades = ?trades,
                    venue_positions = positions.len(),
                    ?tracked,
                    "Filled trap has no identifiable position"
                );
                Metrics::fill_unidentified(symbol, "not_found");
                Ok(self.clear_pending(symbol, cycle_id, slot.order_id))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Operator close-all for one symbol.
    ///
    /// Returns the outcome when a live cycle was concluded. An idle symbol
    /// still has stray tagged pending orders cancelled.
    pub async fn close_all(&self, symbol: &str) -> CycleResult<Option<CycleOutcome>> {
        let config = self.symbol_config(symbol)?;
        if let Some(outcome) = self
            .resolve(config, None, CycleOutcome::ManualCloseAll, true)
            .await
        {
            return Ok(Some(outcome));
        }

        let idle = self
            .store
            .with_state(symbol, |s| !s.active && !s.starting && s.resolving.is_none());
        if idle {
            self.sweep(config, &[], None).await;
        }
        Ok(None)
    }

    /// Operator close-all for every configured symbol.
    pub async fn close_all_symbols(&self) -> Vec<(String, Option<CycleOutcome>)> {
        let mut results = Vec::new();
        for symbol in self.symbols() {
            match self.close_all(&symbol).await {
                Ok(outcome) => results.push((symbol, outcome)),
                Err(e) => error!(symbol = %symbol, error = %e, "Close-all failed"),
            }
        }
        results
    }

    /// Finalize every live cycle as interrupted. Called once on shutdown,
    /// after the scheduler has stopped. Orders and positions stay at the venue.
    pub fn shutdown_finalize(&self) -> Vec<CycleRecord> {
        self.begin_shutdown();
        let now = Utc::now();
        let mut records = Vec::new();
        for symbol in self.symbols() {
            let finalized = self.store.with_state_mut(&symbol, |s| {
                if s.resolving == Some(CycleOutcome::ShutdownInterrupt)
                    || (!s.active && s.tracking.is_none())
                {
                    return None;
                }
                s.resolving = Some(CycleOutcome::ShutdownInterrupt);
                Some((
                    s.finalize(&symbol, CycleOutcome::ShutdownInterrupt, now),
                    s.positions.len(),
                    s.pending.map(|p| p.order_id),
                ))
            });
            let Some((record, open_positions, pending)) = finalized else {
                continue;
            };
            warn!(
                symbol = %symbol,
                open_positions,
                pending = ?pending,
                "Cycle interrupted by shutdown; its positions and orders remain at the venue"
            );
            if let Some(record) = record {
                Metrics::cycle_resolved(&symbol, record.outcome.as_str());
                self.persist(&record);
                records.push(record);
            }
        }
        records
    }

    /// Claim the cycle, finalize telemetry, optionally sweep the venue,
    /// reset, then evaluate auto-restart.
    ///
    /// Returns `None` if another path already owns the cycle.
    async fn resolve(
        &self,
        config: &SymbolConfig,
        expected: Option<Uuid>,
        outcome: CycleOutcome,
        sweep: bool,
    ) -> Option<CycleOutcome> {
        let symbol = config.symbol.as_str();
        let now = Utc::now();
        let (record, positions, pending) = self.store.with_state_mut(symbol, |s| {
            if !s.active || s.resolving.is_some() {
                return None;
            }
            if expected.is_some() && s.cycle_id() != expected {
                return None;
            }
            s.resolving = Some(outcome);
            let record = s.finalize(symbol, outcome, now);
            Some((record, s.positions.clone(), s.pending.map(|p| p.order_id)))
        })?;

        Metrics::cycle_resolved(symbol, outcome.as_str());
        match &record {
            Some(record) => {
                info!(
                    symbol = %symbol,
                    %outcome,
                    traps = record.traps,
                    duration_secs = record.duration_secs,
                    "Cycle resolved"
                );
                self.persist(record);
            }
            None => info!(symbol = %symbol, %outcome, "Cycle resolved without tracking record"),
        }

        if sweep {
            self.sweep(config, &positions, pending).await;
        }
        self.store.with_state_mut(symbol, CycleState::reset);
        self.evaluate_restart(config).await;
        Some(outcome)
    }

    /// Cancel the tracked trap, any other tagged pending order, and close the
    /// tracked positions. Failures are logged and the sweep continues.
    async fn sweep(
        &self,
        config: &SymbolConfig,
        positions: &[PositionId],
        tracked_pending: Option<OrderId>,
    ) {
        let symbol = config.symbol.as_str();
        if let Some(order_id) = tracked_pending {
            self.cancel_quietly(symbol, order_id).await;
        }

        match self.gateway.pending_orders(symbol, config.tag).await {
            Ok(orders) => {
                for order in orders.iter().filter(|o| Some(o.id) != tracked_pending) {
                    info!(symbol = %symbol, order_id = %order.id, "Cancelling stray pending order");
                    self.cancel_quietly(symbol, order.id).await;
                }
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "Could not list pending orders for sweep"),
        }

        for position_id in positions {
            match self.gateway.close_position(*position_id).await {
                Ok(()) => debug!(symbol = %symbol, position_id = %position_id, "Position closed"),
                Err(BrokerError::NotFound(_)) => {
                    debug!(symbol = %symbol, position_id = %position_id, "Position already closed")
                }
                Err(e) => {
                    warn!(symbol = %symbol, position_id = %position_id, error = %e, "Failed to close position")
                }
            }
        }
    }

    async fn cancel_quietly(&self, symbol: &str, order_id: OrderId) {
        match self.gateway.cancel_order(order_id).await {
            Ok(()) => debug!(symbol = %symbol, order_id = %order_id, "Order cancelled"),
            Err(BrokerError::NotFound(_)) => {
                debug!(symbol = %symbol, order_id = %order_id, "Order already gone")
            }
            Err(e) => warn!(symbol = %symbol, order_id = %order_id, error = %e, "Failed to cancel order"),
        }
    }

    fn persist(&self, record: &CycleRecord) {
        if let Err(e) = self.sink.append(record) {
            error!(symbol = %record.symbol, cycle_id = %record.cycle_id, error = %e, "Failed to persist cycle record");
        }
    }

    async fn evaluate_restart(&self, config: &SymbolConfig) {
        let symbol = config.symbol.as_str();
        let (last_l0_side, favored_side) = self
            .store
            .with_state(symbol, |s| (s.last_l0_side, s.favored_side));

        match self
            .restart
            .evaluate(self.in_trading_hours(config), last_l0_side, favored_side)
        {
            RestartDecision::Skip(reason) => {
                if reason.clears_last_direction() {
                    self.store.with_state_mut(symbol, |s| s.last_l0_side = None);
                }
                match reason {
                    RestartSkip::Disabled => debug!(symbol = %symbol, "Auto-restart disabled"),
                    RestartSkip::OutsideTradingHours => {
                        info!(symbol = %symbol, "Outside trading hours, auto-restart deferred")
                    }
                    RestartSkip::NoFavoredDirection => {
                        warn!(symbol = %symbol, "No favored direction set, auto-restart skipped")
                    }
                    RestartSkip::NoPriorDirection => {
                        info!(symbol = %symbol, "No previous L0 direction, auto-restart skipped")
                    }
                }
            }
            RestartDecision::Start(side) => {
                info!(symbol = %symbol, side = %side, "Auto-restarting cycle");
                if !self.settings.restart_delay.is_zero() {
                    let mut shutdown = self.shutdown.subscribe();
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.restart_delay) => {}
                        _ = shutdown.wait_for(|down| *down) => {}
                    }
                }
                if self.is_shutting_down() {
                    info!(symbol = %symbol, side = %side, "Shutdown raised, auto-restart abandoned");
                    return;
                }
                if let Err(e) = self.start_cycle(symbol, side).await {
                    warn!(symbol = %symbol, error = %e, "Auto-restart failed");
                }
            }
        }
    }
}
