//! Engine wired to a paper venue and an in-memory sink.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use rust_decimal_macros::dec;
use trap_broker::{BrokerGateway, FillLinkage, PaperBroker, PaperConfig};
use trap_core::{InstrumentSpec, PositionId, Price, Quote, Size, SymbolConfig, Tag, TradingHours};
use trap_cycle::{CycleEngine, CycleState, EngineSettings, RestartPolicy};
use trap_persistence::MemoryCycleSink;

pub const EURUSD: &str = "EURUSDc";
pub const XAUUSD: &str = "XAUUSDm";

pub fn eurusd_config(max_levels: u32) -> SymbolConfig {
    SymbolConfig {
        symbol: EURUSD.to_string(),
        initial_lot: Size(dec!(0.01)),
        lot_multiplier: dec!(2.5),
        take_profit_pips: dec!(9.5),
        stop_loss_pips: dec!(20.5),
        trigger_distance_pips: dec!(9.5),
        max_levels,
        tag: Tag(67893),
        pip_multiplier: 10,
        always_tradable: false,
        aliases: vec!["eur".to_string()],
    }
}

pub fn xauusd_config() -> SymbolConfig {
    SymbolConfig {
        symbol: XAUUSD.to_string(),
        initial_lot: Size(dec!(0.01)),
        lot_multiplier: dec!(2.5),
        take_profit_pips: dec!(7.3),
        stop_loss_pips: dec!(15.2),
        trigger_distance_pips: dec!(7.3),
        max_levels: 8,
        tag: Tag(67894),
        pip_multiplier: 1000,
        always_tradable: true,
        aliases: vec!["gold".to_string()],
    }
}

fn eurusd_spec() -> InstrumentSpec {
    InstrumentSpec {
        symbol: EURUSD.to_string(),
        point: Price(dec!(0.00001)),
        digits: 5,
        volume_step: Size(dec!(0.01)),
        volume_min: Size(dec!(0.01)),
        volume_max: Size(dec!(100)),
        min_stop_points: 0,
    }
}

fn xauusd_spec() -> InstrumentSpec {
    InstrumentSpec {
        symbol: XAUUSD.to_string(),
        point: Price(dec!(0.001)),
        digits: 3,
        volume_step: Size(dec!(0.01)),
        volume_min: Size(dec!(0.01)),
        volume_max: Size(dec!(50)),
        min_stop_points: 0,
    }
}

pub struct HarnessOptions {
    pub eurusd_max_levels: u32,
    pub linkage: FillLinkage,
    pub auto_restart: bool,
    pub restart_delay: Duration,
    pub local_hour: u32,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            eurusd_max_levels: 100,
            linkage: FillLinkage::Full,
            auto_restart: false,
            restart_delay: Duration::ZERO,
            local_hour: 10,
        }
    }
}

pub struct Harness {
    /// Local hour seen by the trading window.
    pub local_hour: Arc<AtomicU32>,
    pub broker: Arc<PaperBroker>,
    pub sink: Arc<MemoryCycleSink>,
    pub engine: Arc<CycleEngine>,
}

impl Harness {
    pub async fn new(options: HarnessOptions) -> Self {
        let broker = Arc::new(PaperBroker::new(PaperConfig {
            linkage: options.linkage,
            ..PaperConfig::default()
        }));
        broker.add_instrument(
            eurusd_spec(),
            Quote::new(Price(dec!(1.09998)), Price(dec!(1.10000))),
        );
        broker.add_instrument(
            xauusd_spec(),
            Quote::new(Price(dec!(2400.000)), Price(dec!(2400.200))),
        );
        broker.connect().await.unwrap();

        let sink = Arc::new(MemoryCycleSink::new());
        let settings = EngineSettings {
            trading_hours: TradingHours::default(),
            auto_restart: options.auto_restart,
            restart_delay: options.restart_delay,
        };
        let local_hour = Arc::new(AtomicU32::new(options.local_hour));
        let clock_hour = local_hour.clone();
        let engine = CycleEngine::new(
            vec![eurusd_config(options.eurusd_max_levels), xauusd_config()],
            broker.clone(),
            sink.clone(),
            settings,
        )
        .with_restart_policy(RestartPolicy::seeded(options.auto_restart, 11))
        .with_clock(Arc::new(move || {
            NaiveTime::from_hms_opt(clock_hour.load(Ordering::SeqCst), 0, 0).unwrap()
        }));

        Self {
            local_hour,
            broker,
            sink,
            engine: Arc::new(engine),
        }
    }

    /// Move the EURUSD market.
    pub fn eurusd_quote(&self, bid: Price, ask: Price) -> Vec<PositionId> {
        self.broker.set_quote(EURUSD, bid, ask)
    }

    pub fn set_local_hour(&self, hour: u32) {
        self.local_hour.store(hour, Ordering::SeqCst);
    }

    pub fn state(&self, symbol: &str) -> CycleState {
        self.engine.store().snapshot(symbol)
    }
}
