//! Scheduler integration tests.

mod integration;
use integration::common::harness::{Harness, HarnessOptions, EURUSD, XAUUSD};

use std::time::Duration;

use tokio::sync::watch;
use trap_broker::BrokerCall;
use trap_core::{CycleOutcome, OrderSide};
use trap_cycle::{CyclePhase, CycleScheduler};

async fn start_both(harness: &Harness) {
    harness
        .engine
        .start_cycle(EURUSD, OrderSide::Buy)
        .await
        .unwrap();
    harness
        .engine
        .start_cycle(XAUUSD, OrderSide::Sell)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_tick_visits_active_symbols_only() {
    let harness = Harness::new(HarnessOptions::default()).await;
    harness
        .engine
        .start_cycle(XAUUSD, OrderSide::Buy)
        .await
        .unwrap();

    let scheduler = CycleScheduler::new(harness.engine.clone(), Duration::from_millis(10));
    let (_tx, rx) = watch::channel(false);
    let report = scheduler.tick(&rx).await;

    assert_eq!(report.processed, 1);
    assert!(report.failed.is_empty());
    assert!(!report.interrupted);
}

#[tokio::test]
async fn test_venue_outage_isolated_per_symbol() {
    let harness = Harness::new(HarnessOptions::default()).await;
    start_both(&harness).await;
    let before = harness.state(EURUSD);

    let scheduler = CycleScheduler::new(harness.engine.clone(), Duration::from_millis(10));
    let (_tx, rx) = watch::channel(false);

    harness.broker.set_offline(true);
    let report = scheduler.tick(&rx).await;
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, vec![EURUSD.to_string(), XAUUSD.to_string()]);
    // A failed pass leaves state untouched.
    assert_eq!(harness.state(EURUSD), before);

    harness.broker.set_offline(false);
    let report = scheduler.tick(&rx).await;
    assert_eq!(report.processed, 2);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_tick_stops_when_shutdown_raised() {
    let harness = Harness::new(HarnessOptions::default()).await;
    start_both(&harness).await;

    let scheduler = CycleScheduler::new(harness.engine.clone(), Duration::from_millis(10));
    let (_tx, rx) = watch::channel(true);
    let report = scheduler.tick(&rx).await;

    assert!(report.interrupted);
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn test_run_exits_on_shutdown() {
    let harness = Harness::new(HarnessOptions::default()).await;
    start_both(&harness).await;

    let scheduler = CycleScheduler::new(harness.engine.clone(), Duration::from_millis(5));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(rx));

    tokio::time::sleep(Duration::from_millis(30)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler stopped")
        .unwrap();
}

#[tokio::test]
async fn test_run_exits_when_sender_dropped() {
    let harness = Harness::new(HarnessOptions::default()).await;
    let scheduler = CycleScheduler::new(harness.engine.clone(), Duration::from_millis(5));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(rx));

    drop(tx);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler stopped")
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_during_restart_delay_opens_no_cycle() {
    let harness = Harness::new(HarnessOptions {
        auto_restart: true,
        restart_delay: Duration::from_millis(300),
        ..HarnessOptions::default()
    })
    .await;
    let started = harness
        .engine
        .start_with_preference(EURUSD, OrderSide::Buy)
        .await
        .unwrap();
    harness.broker.close_position_externally(started.position_id);
    harness.broker.clear_calls();

    let scheduler = CycleScheduler::new(harness.engine.clone(), Duration::from_millis(10));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(rx));

    // The first tick resolves the cycle and enters the restart delay.
    tokio::time::sleep(Duration::from_millis(80)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler stopped")
        .unwrap();

    let opened: Vec<BrokerCall> = harness
        .broker
        .calls()
        .into_iter()
        .filter(|c| matches!(c, BrokerCall::MarketOrder { .. } | BrokerCall::StopOrder { .. }))
        .collect();
    assert!(opened.is_empty(), "unexpected orders: {opened:?}");
    assert!(harness.engine.is_shutting_down());
    assert_eq!(harness.state(EURUSD).phase(), CyclePhase::Idle);

    assert!(harness.engine.shutdown_finalize().is_empty());
    let records = harness.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CycleOutcome::ManualCloseAll);
}
