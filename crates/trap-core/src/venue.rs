//! Read-only projections of venue state.
//!
//! These are returned by the broker gateway and are only valid for the
//! pass that fetched them.

use crate::{OrderId, OrderSide, PositionId, Price, Size, Tag};
use serde::{Deserialize, Serialize};

/// Best bid/ask for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Price,
    pub ask: Price,
}

impl Quote {
    pub fn new(bid: Price, ask: Price) -> Self {
        Self { bid, ask }
    }

    /// Price at which a market order on `side` executes.
    pub fn entry_price(&self, side: OrderSide) -> Price {
        match side {
            OrderSide::Buy => self.ask,
            OrderSide::Sell => self.bid,
        }
    }

    /// Price at which an open position on `side` would exit.
    pub fn exit_price(&self, side: OrderSide) -> Price {
        match side {
            OrderSide::Buy => self.bid,
            OrderSide::Sell => self.ask,
        }
    }
}

/// An open position at the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub id: PositionId,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: Size,
    pub entry_price: Price,
    /// Zero means not set.
    pub stop_loss: Price,
    /// Zero means not set.
    pub take_profit: Price,
    /// Open time, epoch milliseconds.
    pub opened_at_ms: i64,
    pub tag: Tag,
    pub comment: String,
}

impl PositionSnapshot {
    /// Whether the quote has crossed this position's take-profit.
    ///
    /// Long: bid >= TP. Short: ask <= TP. A zero TP never triggers.
    pub fn take_profit_hit(&self, quote: &Quote) -> bool {
        if !self.take_profit.is_positive() {
            return false;
        }
        match self.side {
            OrderSide::Buy => quote.bid >= self.take_profit,
            OrderSide::Sell => quote.ask <= self.take_profit,
        }
    }
}

/// Order lifecycle state as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderLifecycle {
    Started,
    Placed,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderLifecycle {
    /// Terminal without producing a position.
    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Rejected | Self::Expired)
    }

    /// Still resting at the venue.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Started | Self::Placed | Self::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Placed => "placed",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// An order, live or historical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: Size,
    /// Trigger price for stop orders, zero for market orders.
    pub trigger_price: Price,
    pub state: OrderLifecycle,
    /// Position the order opened, when the venue links it.
    pub position_id: Option<PositionId>,
    /// Completion time, epoch milliseconds.
    pub done_at_ms: Option<i64>,
    pub tag: Tag,
}

/// A trade (deal) executed for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSnapshot {
    pub id: u64,
    pub order_id: OrderId,
    pub position_id: Option<PositionId>,
    pub executed_at_ms: i64,
}
