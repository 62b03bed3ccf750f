//! Reconciliation of tracked state against venue truth.
//!
//! Pure decisions; the engine fetches venue state, calls these, and
//! commits the outcome under the store lock.

use std::collections::HashSet;

use trap_core::{OrderId, OrderLifecycle, OrderSnapshot, PositionId, PositionSnapshot};

/// End-of-cycle condition detected after pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No positions and nothing pending.
    Reset,
    /// No positions but an orphaned pending order.
    CloseAllSweep,
}

/// Keep only tracked positions the venue still reports, in tracked order.
pub fn prune(tracked: &[PositionId], venue: &[PositionSnapshot]) -> Vec<PositionId> {
    let live: HashSet<PositionId> = venue.iter().map(|p| p.id).collect();
    tracked
        .iter()
        .copied()
        .filter(|id| live.contains(id))
        .collect()
}

/// Decide whether the cycle has ended on its own.
pub fn termination(remaining_positions: usize, has_pending: bool) -> Option<Termination> {
    match (remaining_positions, has_pending) {
        (0, false) => Some(Termination::Reset),
        (0, true) => Some(Termination::CloseAllSweep),
        _ => None,
    }
}

/// Venue status of the tracked pending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingStatus {
    /// Still resting.
    Live,
    /// Filled; the position must be attributed.
    Filled(OrderSnapshot),
    /// Terminal without a fill.
    Dead(OrderLifecycle),
    /// Neither in history nor resting.
    Ghost,
}

/// Classify a pending order from its history record and the live order list.
pub fn classify_pending(
    order_id: OrderId,
    history: Option<OrderSnapshot>,
    live_orders: &[OrderSnapshot],
) -> PendingStatus {
    match history {
        Some(order) if order.state == OrderLifecycle::Filled => PendingStatus::Filled(order),
        Some(order) if order.state.is_dead() => PendingStatus::Dead(order.state),
        Some(_) => PendingStatus::Live,
        None if live_orders.iter().any(|o| o.id == order_id && o.state.is_live()) => {
            PendingStatus::Live
        }
        None => PendingStatus::Ghost,
    }
}
