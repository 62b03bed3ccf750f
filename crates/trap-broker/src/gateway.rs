//! Broker gateway trait.
//!
//! Every venue interaction the cycle engine performs goes through
//! [`BrokerGateway`]. Implementations must be safe to call from the
//! scheduler task and the command task concurrently.

use std::pin::Pin;
use std::sync::Arc;

use trap_core::{
    InstrumentSpec, OrderId, OrderSide, OrderSnapshot, PositionId, PositionSnapshot, Price,
    Quote, Size, Tag, TradeSnapshot,
};

use crate::BrokerResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Immediate-execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub volume: Size,
    /// Zero means none.
    pub stop_loss: Price,
    /// Zero means none.
    pub take_profit: Price,
    pub tag: Tag,
    pub comment: String,
}

/// Resting stop order (buy stop above market, sell stop below).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub volume: Size,
    pub trigger_price: Price,
    pub stop_loss: Price,
    pub take_profit: Price,
    pub tag: Tag,
    pub comment: String,
}

/// Venue acknowledgement of a market order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketFill {
    pub order_id: OrderId,
    pub price: Price,
    /// Position opened by the fill, when the venue reports the link.
    pub position_id: Option<PositionId>,
}

/// Venue operations used by the cycle engine.
pub trait BrokerGateway: Send + Sync {
    /// Establish the session.
    fn connect(&self) -> BoxFuture<'_, BrokerResult<()>>;

    /// Tear down the session. Never fails.
    fn disconnect(&self) -> BoxFuture<'_, ()>;

    fn instrument_spec<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, BrokerResult<InstrumentSpec>>;

    fn quote<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, BrokerResult<Quote>>;

    fn place_market_order(&self, request: MarketOrderRequest)
        -> BoxFuture<'_, BrokerResult<MarketFill>>;

    fn place_stop_order(&self, request: StopOrderRequest) -> BoxFuture<'_, BrokerResult<OrderId>>;

    fn cancel_order(&self, order_id: OrderId) -> BoxFuture<'_, BrokerResult<()>>;

    /// Open positions for a symbol carrying the given tag.
    fn open_positions<'a>(
        &'a self,
        symbol: &'a str,
        tag: Tag,
    ) -> BoxFuture<'a, BrokerResult<Vec<PositionSnapshot>>>;

    /// Live (resting) orders for a symbol carrying the given tag.
    fn pending_orders<'a>(
        &'a self,
        symbol: &'a str,
        tag: Tag,
    ) -> BoxFuture<'a, BrokerResult<Vec<OrderSnapshot>>>;

    /// Historical record of an order, if the venue has one.
    fn order_history(&self, order_id: OrderId) -> BoxFuture<'_, BrokerResult<Option<OrderSnapshot>>>;

    /// Trades executed for an order.
    fn order_trades(&self, order_id: OrderId) -> BoxFuture<'_, BrokerResult<Vec<TradeSnapshot>>>;

    fn close_position(&self, position_id: PositionId) -> BoxFuture<'_, BrokerResult<()>>;

    /// Wait for a fill to become visible in position and trade queries.
    fn await_fill_propagation(&self) -> BoxFuture<'_, ()>;
}

/// Arc wrapper for BrokerGateway trait objects.
pub type DynBrokerGateway = Arc<dyn BrokerGateway>;
