//! Cycle scheduler.
//!
//! A fixed-cadence loop: each tick snapshots the active symbols and runs
//! one engine pass per symbol, sequentially. Each symbol is its own
//! failure boundary; an error or panic is logged and counted, and the
//! tick moves on to the next symbol.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use trap_telemetry::Metrics;

use crate::engine::{CycleEngine, PassOutcome};

/// Default cadence between passes.
pub const DEFAULT_INTERVAL_MS: u64 = 1_500;

/// Result of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub processed: usize,
    pub failed: Vec<String>,
    /// Shutdown was raised before every symbol was visited.
    pub interrupted: bool,
}

pub struct CycleScheduler {
    engine: Arc<CycleEngine>,
    interval: Duration,
}

impl CycleScheduler {
    /// Create a new scheduler.
    pub fn new(engine: Arc<CycleEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run until `shutdown` becomes `true` or its sender is dropped.
    ///
    /// A tick already in progress finishes its current symbol first. Shutdown
    /// raised mid-tick is passed to the engine so a pending auto-restart
    /// is abandoned.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "Cycle scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }
            self.tick_watching(&mut shutdown).await;
        }

        self.engine.begin_shutdown();
        info!("Cycle scheduler stopped");
    }

    async fn tick_watching(&self, shutdown: &mut watch::Receiver<bool>) {
        let observed = shutdown.clone();
        let tick = self.tick(&observed);
        tokio::pin!(tick);

        loop {
            tokio::select! {
                _ = &mut tick => return,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.engine.begin_shutdown();
                        tick.await;
                        return;
                    }
                }
            }
        }
    }

    /// One pass over the active symbols.
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> TickReport {
        let started = Instant::now();
        let symbols = self.engine.store().active_symbols();
        let mut report = TickReport::default();

        for symbol in symbols {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }

            let pass = AssertUnwindSafe(self.engine.process_symbol(&symbol))
                .catch_unwind()
                .await;
            report.processed += 1;

            match pass {
                Ok(Ok(PassOutcome::Unchanged | PassOutcome::Inactive)) => {}
                Ok(Ok(outcome)) => debug!(symbol = %symbol, ?outcome, "Symbol pass"),
                Ok(Err(e)) => {
                    if e.is_transient() {
                        warn!(symbol = %symbol, error = %e, "Symbol pass failed, retrying next tick");
                    } else {
                        error!(symbol = %symbol, error = %e, "Symbol pass failed");
                    }
                    Metrics::symbol_error(&symbol);
                    report.failed.push(symbol);
                }
                Err(_) => {
                    error!(symbol = %symbol, "Symbol pass panicked");
                    Metrics::symbol_error(&symbol);
                    report.failed.push(symbol);
                }
            }
        }

        Metrics::tick_duration(started.elapsed().as_secs_f64() * 1000.0);
        report
    }
}
