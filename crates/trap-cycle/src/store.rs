//! Symbol state store.
//!
//! One lock guards every symbol's `CycleState`. The lock is only reachable
//! through closures, so a guard can never be held across an `.await`.
//! Decisions taken from a snapshot must be re-validated through
//! `with_state_mut` before they are committed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use trap_core::{CycleOutcome, CycleRecord, OrderId, OrderSide, PositionId, Price, Size};
use uuid::Uuid;

use crate::telemetry::CycleTrackingRecord;

/// Side and volume of the most recent confirmed level.
///
/// The next pending order is sized and sided from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelBasis {
    pub side: OrderSide,
    pub volume: Size,
}

/// The single pending stop order a symbol may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSlot {
    pub order_id: OrderId,
    pub side: OrderSide,
    pub volume: Size,
    pub trigger_price: Price,
    /// Level this order becomes when filled.
    pub level: u32,
}

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    LevelActive(u32),
    Resolving(CycleOutcome),
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::LevelActive(level) => write!(f, "L{level} active"),
            Self::Resolving(outcome) => write!(f, "resolving ({outcome})"),
        }
    }
}

/// Mutable per-symbol cycle state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleState {
    pub active: bool,
    pub current_level: u32,
    pub l0_price: Option<Price>,
    pub l0_side: Option<OrderSide>,
    /// Tracked positions, oldest first.
    pub positions: Vec<PositionId>,
    pub pending: Option<PendingSlot>,
    pub last_basis: Option<LevelBasis>,
    /// Direction of the most recent L0. Survives resets.
    pub last_l0_side: Option<OrderSide>,
    /// Operator preference. Survives resets.
    pub favored_side: Option<OrderSide>,
    pub tracking: Option<CycleTrackingRecord>,
    /// An L0 market order is in flight.
    pub starting: bool,
    /// Claimed by a resolution path.
    pub resolving: Option<CycleOutcome>,
}

impl CycleState {
    pub fn phase(&self) -> CyclePhase {
        if let Some(outcome) = self.resolving {
            CyclePhase::Resolving(outcome)
        } else if self.active {
            CyclePhase::LevelActive(self.current_level)
        } else {
            CyclePhase::Idle
        }
    }

    pub fn cycle_id(&self) -> Option<Uuid> {
        self.tracking.as_ref().map(|t| t.cycle_id)
    }

    /// Active, not being resolved, and still the cycle identified by `cycle_id`.
    pub fn is_live_cycle(&self, cycle_id: Uuid) -> bool {
        self.active && self.resolving.is_none() && self.cycle_id() == Some(cycle_id)
    }

    /// Activate a cycle around a confirmed L0 position.
    pub fn activate(
        &mut self,
        position_id: PositionId,
        side: OrderSide,
        price: Price,
        volume: Size,
        now: DateTime<Utc>,
    ) {
        self.active = true;
        self.starting = false;
        self.current_level = 0;
        self.l0_price = Some(price);
        self.l0_side = Some(side);
        self.last_l0_side = Some(side);
        self.positions = vec![position_id];
        self.pending = None;
        self.last_basis = Some(LevelBasis { side, volume });
        self.tracking = Some(CycleTrackingRecord::begin(side, now));
    }

    /// Record a fill-driven level. Returns the new level.
    pub fn advance_level(&mut self, position_id: PositionId, basis: LevelBasis) -> u32 {
        self.current_level += 1;
        self.positions.push(position_id);
        self.last_basis = Some(basis);
        if let Some(tracking) = self.tracking.as_mut() {
            tracking.record_level();
        }
        self.current_level
    }

    /// Clear the pending slot only if it still holds `order_id`.
    pub fn clear_pending_if(&mut self, order_id: OrderId) -> bool {
        if self.pending.map(|p| p.order_id) == Some(order_id) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Consume the tracking record. A second call returns `None`.
    pub fn finalize(
        &mut self,
        symbol: &str,
        outcome: CycleOutcome,
        now: DateTime<Utc>,
    ) -> Option<CycleRecord> {
        self.tracking
            .take()
            .map(|tracking| tracking.finish(symbol, outcome, now))
    }

    /// Return to idle, keeping the cross-cycle memory.
    pub fn reset(&mut self) {
        *self = Self {
            last_l0_side: self.last_l0_side,
            favored_side: self.favored_side,
            ..Self::default()
        };
    }
}

/// Shared map of symbol → cycle state.
#[derive(Debug, Clone, Default)]
pub struct SymbolStateStore {
    inner: Arc<Mutex<HashMap<String, CycleState>>>,
}

impl SymbolStateStore {
    /// Create a store with an idle state for each symbol.
    pub fn new<'a>(symbols: impl IntoIterator<Item = &'a str>) -> Self {
        let map = symbols
            .into_iter()
            .map(|s| (s.to_string(), CycleState::default()))
            .collect();
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// Read a symbol's state. Unknown symbols read as idle.
    pub fn with_state<R>(&self, symbol: &str, f: impl FnOnce(&CycleState) -> R) -> R {
        let guard = self.inner.lock();
        match guard.get(symbol) {
            Some(state) => f(state),
            None => f(&CycleState::default()),
        }
    }

    /// Mutate a symbol's state inside the critical section.
    pub fn with_state_mut<R>(&self, symbol: &str, f: impl FnOnce(&mut CycleState) -> R) -> R {
        let mut guard = self.inner.lock();
        f(guard.entry(symbol.to_string()).or_default())
    }

    pub fn snapshot(&self, symbol: &str) -> CycleState {
        self.with_state(symbol, CycleState::clone)
    }

    /// Symbols with an active cycle, sorted.
    pub fn active_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .inner
            .lock()
            .iter()
            .filter(|(_, state)| state.active)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// All known symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.inner.lock().keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn active_state() -> CycleState {
        let mut state = CycleState::default();
        state.activate(
            PositionId(1),
            OrderSide::Buy,
            Price(dec!(1.10000)),
            Size(dec!(0.01)),
            Utc::now(),
        );
        state
    }

    #[test]
    fn test_activate_sets_tracking_and_phase() {
        let state = active_state();
        assert_eq!(state.phase(), CyclePhase::LevelActive(0));
        assert_eq!(state.tracking.as_ref().map(|t| t.traps), Some(1));
        assert_eq!(state.last_l0_side, Some(OrderSide::Buy));
    }

    #[test]
    fn test_finalize_is_one_shot() {
        let mut state = active_state();
        let first = state.finalize("EURUSDc", CycleOutcome::Win, Utc::now());
        let second = state.finalize("EURUSDc", CycleOutcome::ManualCloseAll, Utc::now());
        assert_eq!(first.map(|r| r.outcome), Some(CycleOutcome::Win));
        assert!(second.is_none());
    }

    #[test]
    fn test_reset_keeps_direction_memory() {
        let mut state = active_state();
        state.favored_side = Some(OrderSide::Sell);
        state.reset();
        assert_eq!(state.phase(), CyclePhase::Idle);
        assert!(state.positions.is_empty());
        assert!(state.tracking.is_none());
        assert_eq!(state.last_l0_side, Some(OrderSide::Buy));
        assert_eq!(state.favored_side, Some(OrderSide::Sell));
    }

    #[test]
    fn test_clear_pending_compares_ticket() {
        let mut state = active_state();
        state.pending = Some(PendingSlot {
            order_id: OrderId(5),
            side: OrderSide::Sell,
            volume: Size(dec!(0.03)),
            trigger_price: Price(dec!(1.09905)),
            level: 1,
        });
        assert!(!state.clear_pending_if(OrderId(6)));
        assert!(state.pending.is_some());
        assert!(state.clear_pending_if(OrderId(5)));
        assert!(state.pending.is_none());
    }

    #[test]
    fn test_active_symbols_sorted() {
        let store = SymbolStateStore::new(["XAUUSDm", "EURUSDc", "BTCUSDc"]);
        store.with_state_mut("XAUUSDm", |s| s.active = true);
        store.with_state_mut("BTCUSDc", |s| s.active = true);
        assert_eq!(store.active_symbols(), vec!["BTCUSDc", "XAUUSDm"]);
        assert_eq!(store.symbols().len(), 3);
    }
}
