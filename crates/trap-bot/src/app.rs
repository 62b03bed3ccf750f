//! Main application orchestration.
//!
//! Coordinates all components:
//! - Paper venue and its random-walk price feed
//! - Cycle engine and the reconciliation scheduler
//! - Operator command loop on stdin
//! - Graceful shutdown with cycle finalization

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use trap_broker::{BrokerGateway, FillLinkage, PaperBroker};
use trap_cycle::{CycleEngine, CycleScheduler, EngineSettings};
use trap_persistence::JsonLinesCycleWriter;
use trap_telemetry::Metrics;

use crate::command::{self, CloseTarget, Command, HELP};
use crate::config::{AppConfig, PaperConfig};
use crate::error::AppResult;

/// Main application.
pub struct Application {
    config: AppConfig,
    broker: Arc<PaperBroker>,
    writer: Arc<JsonLinesCycleWriter>,
    engine: Arc<CycleEngine>,
}

impl Application {
    /// Create a new application.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let broker = Arc::new(PaperBroker::new(trap_broker::PaperConfig {
            fill_grace: Duration::from_millis(config.engine.fill_grace_ms),
            linkage: FillLinkage::Full,
            protective_exits: config.paper.protective_exits,
        }));
        for instrument in &config.paper.instruments {
            broker.add_instrument(instrument.spec(), instrument.opening_quote());
        }

        let writer = Arc::new(JsonLinesCycleWriter::new(&config.persistence.data_dir));
        let settings = EngineSettings {
            trading_hours: config.trading_hours,
            auto_restart: config.engine.auto_restart,
            restart_delay: Duration::from_millis(config.engine.restart_delay_ms),
        };
        let engine = Arc::new(CycleEngine::new(
            config.symbols.clone(),
            broker.clone(),
            writer.clone(),
            settings,
        ));

        Ok(Self {
            config,
            broker,
            writer,
            engine,
        })
    }

    pub fn engine(&self) -> &Arc<CycleEngine> {
        &self.engine
    }

    /// Run until `exit`, end of input, or Ctrl+C.
    pub async fn run(self) -> AppResult<()> {
        self.broker.connect().await?;
        self.log_startup();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = CycleScheduler::new(self.engine.clone(), self.config.scheduler_interval());
        let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));
        let feed_handle = tokio::spawn(run_price_feed(
            self.broker.clone(),
            self.config.paper.clone(),
            shutdown_rx,
        ));

        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if self.handle_line(&line).await.is_break() {
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("Command input closed");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to read command input");
                            break;
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown(shutdown_tx, scheduler_handle, feed_handle)
            .await
    }

    fn log_startup(&self) {
        let always: Vec<&str> = self
            .config
            .symbols
            .iter()
            .filter(|s| s.always_tradable)
            .map(|s| s.symbol.as_str())
            .collect();
        info!(
            version = env!("CARGO_PKG_VERSION"),
            symbols = ?self.engine.symbols(),
            trading_hours = %self.config.trading_hours,
            always_tradable = ?always,
            auto_restart = self.config.engine.auto_restart,
            cycle_log = %self.writer.path().display(),
            "Trap cycle bot started"
        );
    }

    /// Execute one operator command line.
    pub(crate) async fn handle_line(&self, line: &str) -> ControlFlow<()> {
        let command = match command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return ControlFlow::Continue(()),
            Err(e) => {
                println!("{e}. {HELP}");
                return ControlFlow::Continue(());
            }
        };
        debug!(?command, "Operator command");

        match command {
            Command::Start { favored, symbol } => {
                let Some(symbol) = self.resolve(&symbol) else {
                    return ControlFlow::Continue(());
                };
                info!(symbol = %symbol, favored = %favored, "USER_CMD start");
                match self.engine.start_with_preference(&symbol, favored).await {
                    Ok(started) => println!(
                        "{}: L0 {} {} @ {} (position #{}), {} favored for restarts",
                        started.symbol,
                        started.side,
                        started.volume,
                        started.entry_price,
                        started.position_id,
                        favored
                    ),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "Cycle not started");
                        println!("Cannot start {symbol}: {e}");
                    }
                }
            }
            Command::Status(symbol) => {
                if let Some(symbol) = self.resolve(&symbol) {
                    match self.engine.status(&symbol) {
                        Ok(status) => println!("{status}"),
                        Err(e) => println!("{e}"),
                    }
                }
            }
            Command::StatusAll => {
                for status in self.engine.status_all() {
                    println!("{status}");
                }
            }
            Command::CloseAll(CloseTarget::All) => {
                info!("USER_CMD closeall all");
                for (symbol, outcome) in self.engine.close_all_symbols().await {
                    match outcome {
                        Some(outcome) => println!("{symbol}: cycle closed ({outcome})"),
                        None => println!("{symbol}: no active cycle"),
                    }
                }
            }
            Command::CloseAll(CloseTarget::Symbol(symbol)) => {
                let Some(symbol) = self.resolve(&symbol) else {
                    return ControlFlow::Continue(());
                };
                info!(symbol = %symbol, "USER_CMD closeall");
                match self.engine.close_all(&symbol).await {
                    Ok(Some(outcome)) => println!("{symbol}: cycle closed ({outcome})"),
                    Ok(None) => println!("{symbol}: no active cycle"),
                    Err(e) => println!("Close-all failed for {symbol}: {e}"),
                }
            }
            Command::Metrics => match Metrics::render() {
                Ok(text) => println!("{text}"),
                Err(e) => error!(error = %e, "Failed to render metrics"),
            },
            Command::Help => println!("{HELP}"),
            Command::Exit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn resolve(&self, name: &str) -> Option<String> {
        let resolved = self.engine.resolve_symbol(name).map(str::to_string);
        if resolved.is_none() {
            println!(
                "Unknown symbol or alias '{name}'. Valid: {}",
                self.engine.symbols().join(", ")
            );
        }
        resolved
    }

    /// Stop the scheduler, then record every live cycle as interrupted.
    /// Positions and orders stay at the venue.
    async fn shutdown(
        &self,
        shutdown_tx: watch::Sender<bool>,
        scheduler_handle: JoinHandle<()>,
        feed_handle: JoinHandle<()>,
    ) -> AppResult<()> {
        info!("Initiating shutdown");
        shutdown_tx.send_replace(true);
        self.engine.begin_shutdown();

        let join_timeout = Duration::from_millis(self.config.scheduler.join_timeout_ms);
        match tokio::time::timeout(join_timeout, scheduler_handle).await {
            Ok(Ok(())) => debug!("Scheduler joined"),
            Ok(Err(e)) => error!(error = %e, "Scheduler task failed"),
            Err(_) => warn!(
                timeout_ms = self.config.scheduler.join_timeout_ms,
                "Scheduler did not stop in time"
            ),
        }
        if tokio::time::timeout(join_timeout, feed_handle).await.is_err() {
            warn!("Price feed did not stop in time");
        }

        let interrupted = self.engine.shutdown_finalize();
        self.writer.flush()?;
        self.broker.disconnect().await;

        info!(interrupted_cycles = interrupted.len(), "Shutdown complete");
        Ok(())
    }
}

/// Random-walk every paper instrument until shutdown.
async fn run_price_feed(
    broker: Arc<PaperBroker>,
    paper: PaperConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(Duration::from_millis(paper.walk_interval_ms.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for instrument in &paper.instruments {
                    if let Some(quote) =
                        broker.random_walk(&instrument.symbol, paper.walk_max_points, &mut rng)
                    {
                        trace!(symbol = %instrument.symbol, bid = %quote.bid, ask = %quote.ask, "Paper quote");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("Price feed stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use trap_core::{CycleOutcome, TradingHours};
    use trap_cycle::CyclePhase;

    fn test_config(data_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.trading_hours = TradingHours::ALWAYS;
        config.engine.auto_restart = false;
        config.engine.fill_grace_ms = 0;
        config.engine.restart_delay_ms = 0;
        config.paper.protective_exits = false;
        config.persistence.data_dir = data_dir.to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_commands_drive_engine() {
        let dir = tempfile::tempdir().unwrap();
        let app = Application::new(test_config(dir.path())).unwrap();
        app.broker.connect().await.unwrap();

        assert!(app.handle_line("buy eur").await.is_continue());
        let status = app.engine().status("EURUSDc").unwrap();
        assert_eq!(status.phase, CyclePhase::LevelActive(0));
        assert!(status.pending.is_some());

        assert!(app.handle_line("statusall").await.is_continue());
        assert!(app.handle_line("closeall all").await.is_continue());
        assert_eq!(
            app.engine().status("EURUSDc").unwrap().phase,
            CyclePhase::Idle
        );

        app.writer.flush().unwrap();
        let contents = std::fs::read_to_string(app.writer.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains(CycleOutcome::ManualCloseAll.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_input_keeps_running() {
        let dir = tempfile::tempdir().unwrap();
        let app = Application::new(test_config(dir.path())).unwrap();
        app.broker.connect().await.unwrap();

        assert!(app.handle_line("buy nowhere").await.is_continue());
        assert!(app.handle_line("launch").await.is_continue());
        assert!(app.handle_line("").await.is_continue());
        assert!(app.engine().store().active_symbols().is_empty());
    }

    #[tokio::test]
    async fn test_exit_breaks_loop() {
        let dir = tempfile::tempdir().unwrap();
        let app = Application::new(test_config(dir.path())).unwrap();
        assert!(app.handle_line("exit").await.is_break());
    }
}
