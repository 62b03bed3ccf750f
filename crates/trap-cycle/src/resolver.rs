//! Fill resolver.
//!
//! Attributes a filled pending order to the position it opened. Strategies
//! are tried in rank order and the first confident answer wins:
//!
//! 1. `OrderLink`: the order record names its position.
//! 2. `TradeLink`: the newest trade for the order names a position.
//! 3. `Heuristic`: the most recently opened untracked position on the
//!    order's side, opened strictly within the tolerance of the order's
//!    completion.
//!
//! Positions already tracked by the cycle are never returned.

use trap_core::{OrderSnapshot, PositionId, PositionSnapshot, TradeSnapshot};

/// Exclusive bound on the gap between order completion and position open
/// for the heuristic.
pub const HEURISTIC_TOLERANCE_MS: i64 = 5_000;

/// Which strategy produced an attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    OrderLink,
    TradeLink,
    Heuristic,
}

impl std::fmt::Display for Attribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrderLink => write!(f, "order_link"),
            Self::TradeLink => write!(f, "trade_link"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Result of attributing a fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillResolution {
    Identified {
        position: PositionSnapshot,
        via: Attribution,
    },
    /// Evidence exists but does not single out one new position.
    Ambiguous { candidates: Vec<PositionId> },
    NotFound,
}

/// Ranked fill attribution.
#[derive(Debug, Clone, Copy)]
pub struct FillResolver {
    tolerance_ms: i64,
}

impl Default for FillResolver {
    fn default() -> Self {
        Self {
            tolerance_ms: HEURISTIC_TOLERANCE_MS,
        }
    }
}

impl FillResolver {
    pub fn new(tolerance_ms: i64) -> Self {
        Self { tolerance_ms }
    }

    /// Attribute `order` using its trades and the venue's open positions
    /// (already filtered to the symbol and tag).
    pub fn resolve(
        &self,
        order: &OrderSnapshot,
        trades: &[TradeSnapshot],
        positions: &[PositionSnapshot],
        tracked: &[PositionId],
    ) -> FillResolution {
        let find_new = |id: PositionId| {
            if tracked.contains(&id) {
                return None;
            }
            positions.iter().find(|p| p.id == id)
        };
        let mut linked_to_tracked = Vec::new();

        if let Some(id) = order.position_id {
            if let Some(position) = find_new(id) {
                return FillResolution::Identified {
                    position: position.clone(),
                    via: Attribution::OrderLink,
                };
            }
            if tracked.contains(&id) {
                linked_to_tracked.push(id);
            }
        }

        let mut trades: Vec<&TradeSnapshot> = trades
            .iter()
            .filter(|t| t.order_id == order.id)
            .collect();
        trades.sort_by(|a, b| b.executed_at_ms.cmp(&a.executed_at_ms));
        for trade in trades {
            let Some(id) = trade.position_id else {
                continue;
            };
            if let Some(position) = find_new(id) {
                return FillResolution::Identified {
                    position: position.clone(),
                    via: Attribution::TradeLink,
                };
            }
            if tracked.contains(&id) && !linked_to_tracked.contains(&id) {
                linked_to_tracked.push(id);
            }
        }

        if let Some(done_at) = order.done_at_ms {
            let mut candidates: Vec<&PositionSnapshot> = positions
                .iter()
                .filter(|p| !tracked.contains(&p.id))
                .filter(|p| p.side == order.side)
                .filter(|p| (p.opened_at_ms - done_at).abs() < self.tolerance_ms)
                .collect();
            candidates.sort_by(|a, b| b.opened_at_ms.cmp(&a.opened_at_ms));

            match candidates.as_slice() {
                [] => {}
                [first, second, ..] if first.opened_at_ms == second.opened_at_ms => {
                    return FillResolution::Ambiguous {
                        candidates: candidates
                            .iter()
                            .take_while(|p| p.opened_at_ms == first.opened_at_ms)
                            .map(|p| p.id)
                            .collect(),
                    };
                }
                [first, ..] => {
                    return FillResolution::Identified {
                        position: (*first).clone(),
                        via: Attribution::Heuristic,
                    };
                }
            }
        }

        if linked_to_tracked.is_empty() {
            FillResolution::NotFound
        } else {
            FillResolution::Ambiguous {
                candidates: linked_to_tracked,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trap_core::{OrderId, OrderLifecycle, OrderSide, Price, Size, Tag};

    fn order(position_id: Option<PositionId>, done_at_ms: Option<i64>) -> OrderSnapshot {
        OrderSnapshot {
            id: OrderId(10),
            symbol: "EURUSDc".to_string(),
            side: OrderSide::Sell,
            volume: Size(dec!(0.03)),
            trigger_price: Price(dec!(1.09905)),
            state: OrderLifecycle::Filled,
            position_id,
            done_at_ms,
            tag: Tag(1),
        }
    }

    fn position(id: u64, side: OrderSide, opened_at_ms: i64) -> PositionSnapshot {
        PositionSnapshot {
            id: PositionId(id),
            symbol: "EURUSDc".to_string(),
            side,
            volume: Size(dec!(0.03)),
            entry_price: Price(dec!(1.09905)),
            stop_loss: Price::ZERO,
            take_profit: Price::ZERO,
            opened_at_ms,
            tag: Tag(1),
            comment: String::new(),
        }
    }

    fn trade(id: u64, position_id: Option<u64>, executed_at_ms: i64) -> TradeSnapshot {
        TradeSnapshot {
            id,
            order_id: OrderId(10),
            position_id: position_id.map(PositionId),
            executed_at_ms,
        }
    }

    #[test]
    fn test_order_link_wins() {
        let positions = vec![position(1, OrderSide::Buy, 0), position(2, OrderSide::Sell, 100)];
        let resolution = FillResolver::default().resolve(
            &order(Some(PositionId(2)), Some(100)),
            &[],
            &positions,
            &[PositionId(1)],
        );
        assert!(matches!(
            resolution,
            FillResolution::Identified { ref position, via: Attribution::OrderLink } if position.id == PositionId(2)
        ));
    }

    #[test]
    fn test_trade_link_uses_newest_trade() {
        let positions = vec![
            position(1, OrderSide::Buy, 0),
            position(2, OrderSide::Sell, 100),
            position(3, OrderSide::Sell, 200),
        ];
        let trades = vec![trade(50, Some(2), 100), trade(51, Some(3), 200)];
        let resolution = FillResolver::default().resolve(
            &order(None, Some(200)),
            &trades,
            &positions,
            &[PositionId(1)],
        );
        assert!(matches!(
            resolution,
            FillResolution::Identified { ref position, via: Attribution::TradeLink } if position.id == PositionId(3)
        ));
    }

    #[test]
    fn test_heuristic_prefers_most_recent() {
        let positions = vec![
            position(1, OrderSide::Buy, 1_000),
            position(2, OrderSide::Sell, 9_000),
            position(3, OrderSide::Sell, 10_000),
            position(4, OrderSide::Buy, 10_050),
        ];
        let resolution = FillResolver::default().resolve(
            &order(None, Some(10_000)),
            &[],
            &positions,
            &[PositionId(1)],
        );
        assert!(matches!(
            resolution,
            FillResolution::Identified { ref position, via: Attribution::Heuristic } if position.id == PositionId(3)
        ));
    }

    #[test]
    fn test_heuristic_respects_tolerance() {
        let positions = vec![position(2, OrderSide::Sell, 1_000)];
        let resolution =
            FillResolver::default().resolve(&order(None, Some(7_000)), &[], &positions, &[]);
        assert_eq!(resolution, FillResolution::NotFound);
    }

    #[test]
    fn test_heuristic_window_is_exclusive() {
        let positions = vec![position(2, OrderSide::Sell, 1_000)];
        let resolution =
            FillResolver::default().resolve(&order(None, Some(6_000)), &[], &positions, &[]);
        assert_eq!(resolution, FillResolution::NotFound);

        let resolution =
            FillResolver::default().resolve(&order(None, Some(5_999)), &[], &positions, &[]);
        assert!(matches!(
            resolution,
            FillResolution::Identified { via: Attribution::Heuristic, .. }
        ));
    }

    #[test]
    fn test_heuristic_tie_is_ambiguous() {
        let positions = vec![position(2, OrderSide::Sell, 5_000), position(3, OrderSide::Sell, 5_000)];
        let resolution =
            FillResolver::default().resolve(&order(None, Some(5_000)), &[], &positions, &[]);
        assert_eq!(
            resolution,
            FillResolution::Ambiguous {
                candidates: vec![PositionId(2), PositionId(3)]
            }
        );
    }

    #[test]
    fn test_links_to_tracked_only_is_ambiguous() {
        let positions = vec![position(1, OrderSide::Sell, 0)];
        let resolution = FillResolver::default().resolve(
            &order(Some(PositionId(1)), None),
            &[trade(50, Some(1), 0)],
            &positions,
            &[PositionId(1)],
        );
        assert_eq!(
            resolution,
            FillResolution::Ambiguous {
                candidates: vec![PositionId(1)]
            }
        );
    }

    #[test]
    fn test_nothing_found() {
        let resolution = FillResolver::default().resolve(&order(None, None), &[], &[], &[]);
        assert_eq!(resolution, FillResolution::NotFound);
    }
}
