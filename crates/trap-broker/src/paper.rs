//! In-process simulated venue.
//!
//! `PaperBroker` keeps positions, resting stop orders, order history and
//! trades in memory. Quotes are pushed in by the caller (tests, or the
//! binary's random-walk feed); resting stops trigger when the quote
//! crosses them. Every mutating call is recorded for verification.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::debug;
use trap_core::{
    InstrumentSpec, OrderId, OrderLifecycle, OrderSide, OrderSnapshot, PositionId,
    PositionSnapshot, Price, Quote, Size, Tag, TradeSnapshot,
};

use crate::gateway::{
    BoxFuture, BrokerGateway, MarketFill, MarketOrderRequest, StopOrderRequest,
};
use crate::{BrokerError, BrokerResult};

/// How much fill linkage the simulated venue reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillLinkage {
    /// Orders and trades both reference the opened position.
    #[default]
    Full,
    /// Only trades reference the position.
    TradesOnly,
    /// Neither orders nor trades reference the position.
    Unlinked,
}

/// Paper venue behaviour.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    /// Returned by `await_fill_propagation`.
    pub fill_grace: Duration,
    pub linkage: FillLinkage,
    /// Close positions server-side when a quote crosses their SL or TP.
    pub protective_exits: bool,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            fill_grace: Duration::ZERO,
            linkage: FillLinkage::Full,
            protective_exits: false,
        }
    }
}

/// A mutating call received by the paper venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    MarketOrder {
        symbol: String,
        side: OrderSide,
        volume: Size,
    },
    StopOrder {
        order_id: OrderId,
        symbol: String,
        side: OrderSide,
        volume: Size,
        trigger_price: Price,
    },
    Cancel(OrderId),
    Close(PositionId),
}

#[derive(Debug, Clone)]
struct RestingOrder {
    snapshot: OrderSnapshot,
    stop_loss: Price,
    take_profit: Price,
    comment: String,
}

#[derive(Debug, Default)]
struct PaperState {
    connected: bool,
    offline: bool,
    specs: HashMap<String, InstrumentSpec>,
    quotes: HashMap<String, Quote>,
    positions: BTreeMap<PositionId, PositionSnapshot>,
    resting: BTreeMap<OrderId, RestingOrder>,
    history: HashMap<OrderId, OrderSnapshot>,
    trades: Vec<TradeSnapshot>,
    next_ticket: u64,
    clock_ms: Option<i64>,
    reject_next_stop: Option<String>,
    calls: Vec<BrokerCall>,
}

impl PaperState {
    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn now_ms(&self) -> i64 {
        self.clock_ms
            .unwrap_or_else(|| Utc::now().timestamp_millis())
    }

    fn ensure_online(&self) -> BrokerResult<()> {
        if self.offline {
            return Err(BrokerError::Connectivity("venue unreachable".to_string()));
        }
        if !self.connected {
            return Err(BrokerError::Connectivity("not connected".to_string()));
        }
        Ok(())
    }

    fn spec(&self, symbol: &str) -> BrokerResult<&InstrumentSpec> {
        self.specs
            .get(symbol)
            .ok_or_else(|| BrokerError::UnknownSymbol(symbol.to_string()))
    }

    fn quote(&self, symbol: &str) -> BrokerResult<Quote> {
        self.quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::NoQuote(symbol.to_string()))
    }

    fn check_volume(&self, symbol: &str, volume: Size) -> BrokerResult<()> {
        let spec = self.spec(symbol)?;
        if volume < spec.volume_min || volume > spec.volume_max {
            return Err(BrokerError::OrderRejected(format!(
                "invalid volume {volume} for {symbol}"
            )));
        }
        Ok(())
    }

    /// Open a position for a resting order and move the order to history.
    fn fill(&mut self, order_id: OrderId, linkage: FillLinkage) -> Option<PositionId> {
        let order = self.resting.remove(&order_id)?;
        let now = self.now_ms();
        let position_id = PositionId(self.ticket());
        let trade_id = self.ticket();

        self.positions.insert(
            position_id,
            PositionSnapshot {
                id: position_id,
                symbol: order.snapshot.symbol.clone(),
                side: order.snapshot.side,
                volume: order.snapshot.volume,
                entry_price: order.snapshot.trigger_price,
                stop_loss: order.stop_loss,
                take_profit: order.take_profit,
                opened_at_ms: now,
                tag: order.snapshot.tag,
                comment: order.comment,
            },
        );

        let mut done = order.snapshot;
        done.state = OrderLifecycle::Filled;
        done.done_at_ms = Some(now);
        if linkage == FillLinkage::Full {
            done.position_id = Some(position_id);
        }
        self.history.insert(order_id, done);

        self.trades.push(TradeSnapshot {
            id: trade_id,
            order_id,
            position_id: (linkage != FillLinkage::Unlinked).then_some(position_id),
            executed_at_ms: now,
        });

        debug!(order_id = %order_id, position_id = %position_id, "Paper stop order filled");
        Some(position_id)
    }

    fn finish_order(&mut self, order_id: OrderId, state: OrderLifecycle) -> BrokerResult<()> {
        let order = self
            .resting
            .remove(&order_id)
            .ok_or_else(|| BrokerError::NotFound(format!("order {order_id}")))?;
        let mut done = order.snapshot;
        done.state = state;
        done.done_at_ms = Some(self.now_ms());
        self.history.insert(order_id, done);
        Ok(())
    }
}

/// Simulated venue.
#[derive(Debug)]
pub struct PaperBroker {
    config: PaperConfig,
    state: Mutex<PaperState>,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new(PaperConfig::default())
    }
}

impl PaperBroker {
    /// Create a new paper venue with no instruments.
    pub fn new(config: PaperConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PaperState {
                next_ticket: 1000,
                ..PaperState::default()
            }),
        }
    }

    /// Register an instrument with its opening quote.
    pub fn add_instrument(&self, spec: InstrumentSpec, quote: Quote) {
        let mut state = self.state.lock();
        state.quotes.insert(spec.symbol.clone(), quote);
        state.specs.insert(spec.symbol.clone(), spec);
    }

    /// Move the market. Resting stops crossed by the new quote are filled.
    ///
    /// Returns the positions opened by triggered stops.
    pub fn set_quote(&self, symbol: &str, bid: Price, ask: Price) -> Vec<PositionId> {
        let mut state = self.state.lock();
        let quote = Quote::new(bid, ask);
        state.quotes.insert(symbol.to_string(), quote);

        let triggered: Vec<OrderId> = state
            .resting
            .values()
            .filter(|o| o.snapshot.symbol == symbol)
            .filter(|o| match o.snapshot.side {
                OrderSide::Buy => ask >= o.snapshot.trigger_price,
                OrderSide::Sell => bid <= o.snapshot.trigger_price,
            })
            .map(|o| o.snapshot.id)
            .collect();

        let opened = triggered
            .into_iter()
            .filter_map(|id| state.fill(id, self.config.linkage))
            .collect();

        if self.config.protective_exits {
            let exited: Vec<PositionId> = state
                .positions
                .values()
                .filter(|p| p.symbol == symbol)
                .filter(|p| p.take_profit_hit(&quote) || stop_loss_hit(p, &quote))
                .map(|p| p.id)
                .collect();
            for id in exited {
                state.positions.remove(&id);
                debug!(position_id = %id, "Paper position closed at protective level");
            }
        }

        opened
    }

    /// Apply a random step of up to `max_points` points to a symbol's quote.
    pub fn random_walk<R: Rng>(&self, symbol: &str, max_points: i64, rng: &mut R) -> Option<Quote> {
        let (quote, point) = {
            let state = self.state.lock();
            let quote = state.quotes.get(symbol).copied()?;
            let point = state.specs.get(symbol)?.point;
            (quote, point)
        };
        let step = point * Decimal::from(rng.gen_range(-max_points..=max_points));
        let next = Quote::new(quote.bid + step, quote.ask + step);
        self.set_quote(symbol, next.bid, next.ask);
        Some(next)
    }

    /// Fill a resting order at its trigger price regardless of the quote.
    pub fn trigger_order(&self, order_id: OrderId) -> BrokerResult<PositionId> {
        self.state
            .lock()
            .fill(order_id, self.config.linkage)
            .ok_or_else(|| BrokerError::NotFound(format!("order {order_id}")))
    }

    /// Remove a position as if it was closed outside the bot.
    pub fn close_position_externally(&self, position_id: PositionId) -> bool {
        self.state.lock().positions.remove(&position_id).is_some()
    }

    /// Cancel a resting order as if done outside the bot.
    pub fn cancel_order_externally(&self, order_id: OrderId) -> BrokerResult<()> {
        self.state
            .lock()
            .finish_order(order_id, OrderLifecycle::Cancelled)
    }

    /// Expire a resting order.
    pub fn expire_order(&self, order_id: OrderId) -> BrokerResult<()> {
        self.state
            .lock()
            .finish_order(order_id, OrderLifecycle::Expired)
    }

    /// Drop every trace of an order, leaving a ghost reference behind.
    pub fn forget_order(&self, order_id: OrderId) {
        let mut state = self.state.lock();
        state.resting.remove(&order_id);
        state.history.remove(&order_id);
    }

    /// Simulate an outage (`true`) or recovery (`false`).
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Pin the venue clock. `None` follows wall time.
    pub fn set_time_ms(&self, now_ms: Option<i64>) {
        self.state.lock().clock_ms = now_ms;
    }

    /// Reject the next stop order with `reason`.
    pub fn reject_next_stop_order(&self, reason: &str) {
        self.state.lock().reject_next_stop = Some(reason.to_string());
    }

    /// Open a position directly, bypassing order flow.
    pub fn inject_position(&self, mut position: PositionSnapshot) -> PositionId {
        let mut state = self.state.lock();
        let id = PositionId(state.ticket());
        position.id = id;
        state.positions.insert(id, position);
        id
    }

    /// Mutating calls received so far.
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// All open positions for a symbol, any tag.
    pub fn positions(&self, symbol: &str) -> Vec<PositionSnapshot> {
        self.state
            .lock()
            .positions
            .values()
            .filter(|p| p.symbol == symbol)
            .cloned()
            .collect()
    }

    /// All resting orders for a symbol, any tag.
    pub fn resting_orders(&self, symbol: &str) -> Vec<OrderSnapshot> {
        self.state
            .lock()
            .resting
            .values()
            .filter(|o| o.snapshot.symbol == symbol)
            .map(|o| o.snapshot.clone())
            .collect()
    }

    fn market_order_sync(&self, request: MarketOrderRequest) -> BrokerResult<MarketFill> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        state.calls.push(BrokerCall::MarketOrder {
            symbol: request.symbol.clone(),
            side: request.side,
            volume: request.volume,
        });
        state.check_volume(&request.symbol, request.volume)?;
        let price = state.quote(&request.symbol)?.entry_price(request.side);

        let now = state.now_ms();
        let order_id = OrderId(state.ticket());
        let position_id = PositionId(state.ticket());
        let trade_id = state.ticket();

        state.positions.insert(
            position_id,
            PositionSnapshot {
                id: position_id,
                symbol: request.symbol.clone(),
                side: request.side,
                volume: request.volume,
                entry_price: price,
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                opened_at_ms: now,
                tag: request.tag,
                comment: request.comment,
            },
        );
        let linked = self.config.linkage == FillLinkage::Full;
        state.history.insert(
            order_id,
            OrderSnapshot {
                id: order_id,
                symbol: request.symbol,
                side: request.side,
                volume: request.volume,
                trigger_price: Price::ZERO,
                state: OrderLifecycle::Filled,
                position_id: linked.then_some(position_id),
                done_at_ms: Some(now),
                tag: request.tag,
            },
        );
        state.trades.push(TradeSnapshot {
            id: trade_id,
            order_id,
            position_id: (self.config.linkage != FillLinkage::Unlinked).then_some(position_id),
            executed_at_ms: now,
        });

        Ok(MarketFill {
            order_id,
            price,
            position_id: linked.then_some(position_id),
        })
    }

    fn stop_order_sync(&self, request: StopOrderRequest) -> BrokerResult<OrderId> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        state.check_volume(&request.symbol, request.volume)?;
        if let Some(reason) = state.reject_next_stop.take() {
            return Err(BrokerError::OrderRejected(reason));
        }

        let quote = state.quote(&request.symbol)?;
        let min_distance = state.spec(&request.symbol)?.min_stop_distance();
        let valid = match request.side {
            OrderSide::Buy => request.trigger_price >= quote.ask + min_distance,
            OrderSide::Sell => request.trigger_price <= quote.bid - min_distance,
        };
        if !valid {
            return Err(BrokerError::OrderRejected(format!(
                "invalid stop price {} for {} {}",
                request.trigger_price, request.side, request.symbol
            )));
        }

        let order_id = OrderId(state.ticket());
        state.calls.push(BrokerCall::StopOrder {
            order_id,
            symbol: request.symbol.clone(),
            side: request.side,
            volume: request.volume,
            trigger_price: request.trigger_price,
        });
        state.resting.insert(
            order_id,
            RestingOrder {
                snapshot: OrderSnapshot {
                    id: order_id,
                    symbol: request.symbol,
                    side: request.side,
                    volume: request.volume,
                    trigger_price: request.trigger_price,
                    state: OrderLifecycle::Placed,
                    position_id: None,
                    done_at_ms: None,
                    tag: request.tag,
                },
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                comment: request.comment,
            },
        );
        Ok(order_id)
    }

    fn cancel_sync(&self, order_id: OrderId) -> BrokerResult<()> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        state.calls.push(BrokerCall::Cancel(order_id));
        state.finish_order(order_id, OrderLifecycle::Cancelled)
    }

    fn close_sync(&self, position_id: PositionId) -> BrokerResult<()> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        state.calls.push(BrokerCall::Close(position_id));
        state
            .positions
            .remove(&position_id)
            .map(|_| ())
            .ok_or_else(|| BrokerError::NotFound(format!("position {position_id}")))
    }

    fn read<T>(&self, f: impl FnOnce(&PaperState) -> BrokerResult<T>) -> BrokerResult<T> {
        let state = self.state.lock();
        state.ensure_online()?;
        f(&state)
    }
}

fn stop_loss_hit(position: &PositionSnapshot, quote: &Quote) -> bool {
    if !position.stop_loss.is_positive() {
        return false;
    }
    match position.side {
        OrderSide::Buy => quote.bid <= position.stop_loss,
        OrderSide::Sell => quote.ask >= position.stop_loss,
    }
}

impl BrokerGateway for PaperBroker {
    fn connect(&self) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if state.offline {
                return Err(BrokerError::Connectivity("venue unreachable".to_string()));
            }
            state.connected = true;
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().connected = false;
        })
    }

    fn instrument_spec<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, BrokerResult<InstrumentSpec>> {
        Box::pin(async move { self.read(|s| s.spec(symbol).cloned()) })
    }

    fn quote<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, BrokerResult<Quote>> {
        Box::pin(async move { self.read(|s| s.quote(symbol)) })
    }

    fn place_market_order(
        &self,
        request: MarketOrderRequest,
    ) -> BoxFuture<'_, BrokerResult<MarketFill>> {
        Box::pin(async move { self.market_order_sync(request) })
    }

    fn place_stop_order(&self, request: StopOrderRequest) -> BoxFuture<'_, BrokerResult<OrderId>> {
        Box::pin(async move { self.stop_order_sync(request) })
    }

    fn cancel_order(&self, order_id: OrderId) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move { self.cancel_sync(order_id) })
    }

    fn open_positions<'a>(
        &'a self,
        symbol: &'a str,
        tag: Tag,
    ) -> BoxFuture<'a, BrokerResult<Vec<PositionSnapshot>>> {
        Box::pin(async move {
            self.read(|s| {
                Ok(s.positions
                    .values()
                    .filter(|p| p.symbol == symbol && p.tag == tag)
                    .cloned()
                    .collect())
            })
        })
    }

    fn pending_orders<'a>(
        &'a self,
        symbol: &'a str,
        tag: Tag,
    ) -> BoxFuture<'a, BrokerResult<Vec<OrderSnapshot>>> {
        Box::pin(async move {
            self.read(|s| {
                Ok(s.resting
                    .values()
                    .filter(|o| o.snapshot.symbol == symbol && o.snapshot.tag == tag)
                    .map(|o| o.snapshot.clone())
                    .collect())
            })
        })
    }

    fn order_history(&self, order_id: OrderId) -> BoxFuture<'_, BrokerResult<Option<OrderSnapshot>>> {
        Box::pin(async move { self.read(|s| Ok(s.history.get(&order_id).cloned())) })
    }

    fn order_trades(&self, order_id: OrderId) -> BoxFuture<'_, BrokerResult<Vec<TradeSnapshot>>> {
        Box::pin(async move {
            self.read(|s| {
                Ok(s.trades
                    .iter()
                    .filter(|t| t.order_id == order_id)
                    .cloned()
                    .collect())
            })
        })
    }

    fn close_position(&self, position_id: PositionId) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move { self.close_sync(position_id) })
    }

    fn await_fill_propagation(&self) -> BoxFuture<'_, ()> {
        let grace = self.config.fill_grace;
        Box::pin(async move {
            if !grace.is_zero() {
                tokio::time::sleep(grace).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eurusd() -> InstrumentSpec {
        InstrumentSpec {
            symbol: "EURUSDc".to_string(),
            point: Price(dec!(0.00001)),
            digits: 5,
            volume_step: Size(dec!(0.01)),
            volume_min: Size(dec!(0.01)),
            volume_max: Size(dec!(100)),
            min_stop_points: 10,
        }
    }

    async fn broker(linkage: FillLinkage) -> PaperBroker {
        let broker = PaperBroker::new(PaperConfig {
            linkage,
            ..PaperConfig::default()
        });
        broker.add_instrument(
            eurusd(),
            Quote::new(Price(dec!(1.10000)), Price(dec!(1.10002))),
        );
        broker.connect().await.unwrap();
        broker
    }

    fn sell_stop(trigger: Price) -> StopOrderRequest {
        StopOrderRequest {
            symbol: "EURUSDc".to_string(),
            side: OrderSide::Sell,
            volume: Size(dec!(0.03)),
            trigger_price: trigger,
            stop_loss: Price::ZERO,
            take_profit: Price::ZERO,
            tag: Tag(7),
            comment: "TrapCycle L1 M7".to_string(),
        }
    }

    #[tokio::test]
    async fn test_market_order_opens_linked_position() {
        let broker = broker(FillLinkage::Full).await;
        let fill = broker
            .place_market_order(MarketOrderRequest {
                symbol: "EURUSDc".to_string(),
                side: OrderSide::Buy,
                volume: Size(dec!(0.01)),
                stop_loss: Price::ZERO,
                take_profit: Price::ZERO,
                tag: Tag(7),
                comment: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(fill.price, Price(dec!(1.10002)));
        let positions = broker.open_positions("EURUSDc", Tag(7)).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(Some(positions[0].id), fill.position_id);
        assert!(broker.open_positions("EURUSDc", Tag(8)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_triggers_when_quote_crosses() {
        let broker = broker(FillLinkage::Full).await;
        let id = broker
            .place_stop_order(sell_stop(Price(dec!(1.09905))))
            .await
            .unwrap();

        assert!(broker
            .set_quote("EURUSDc", Price(dec!(1.09906)), Price(dec!(1.09908)))
            .is_empty());
        let opened = broker.set_quote("EURUSDc", Price(dec!(1.09905)), Price(dec!(1.09907)));
        assert_eq!(opened.len(), 1);

        let history = broker.order_history(id).await.unwrap().unwrap();
        assert_eq!(history.state, OrderLifecycle::Filled);
        assert_eq!(history.position_id, Some(opened[0]));
        assert!(broker.pending_orders("EURUSDc", Tag(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trades_only_linkage_hides_order_link() {
        let broker = broker(FillLinkage::TradesOnly).await;
        let id = broker
            .place_stop_order(sell_stop(Price(dec!(1.09905))))
            .await
            .unwrap();
        let position = broker.trigger_order(id).unwrap();

        let history = broker.order_history(id).await.unwrap().unwrap();
        assert_eq!(history.position_id, None);
        let trades = broker.order_trades(id).await.unwrap();
        assert_eq!(trades[0].position_id, Some(position));
    }

    #[tokio::test]
    async fn test_stop_too_close_is_rejected() {
        let broker = broker(FillLinkage::Full).await;
        // bid 1.10000 - 10 points = 1.09990 is the highest valid sell stop
        let err = broker
            .place_stop_order(sell_stop(Price(dec!(1.09995))))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::OrderRejected(_)));
    }

    #[tokio::test]
    async fn test_offline_venue_reports_connectivity() {
        let broker = broker(FillLinkage::Full).await;
        broker.set_offline(true);
        let err = broker.quote("EURUSDc").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_cancel_moves_order_to_history() {
        let broker = broker(FillLinkage::Full).await;
        let id = broker
            .place_stop_order(sell_stop(Price(dec!(1.09905))))
            .await
            .unwrap();
        broker.cancel_order(id).await.unwrap();

        let history = broker.order_history(id).await.unwrap().unwrap();
        assert_eq!(history.state, OrderLifecycle::Cancelled);
        assert!(broker.calls().contains(&BrokerCall::Cancel(id)));
    }
}
