//! Application configuration.

use std::path::Path;
use std::time::Duration;

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use trap_core::{InstrumentSpec, Price, Quote, Size, SymbolConfig, Tag, TradingHours};

use crate::error::{AppError, AppResult};

/// Scheduler cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pause between passes (ms). Default: 1,500.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// How long shutdown waits for an in-flight pass (ms). Default: 5,000.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    trap_cycle::DEFAULT_INTERVAL_MS
}

fn default_join_timeout_ms() -> u64 {
    5_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

/// Cycle engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Start a new cycle after one resolves. Default: true.
    #[serde(default = "default_auto_restart")]
    pub auto_restart: bool,
    /// Pause after a fill before its position is looked up (ms). Default: 1,000.
    #[serde(default = "default_fill_grace_ms")]
    pub fill_grace_ms: u64,
    /// Pause before an automatic restart (ms). Default: 1,500.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

fn default_auto_restart() -> bool {
    true
}

fn default_fill_grace_ms() -> u64 {
    1_000
}

fn default_restart_delay_ms() -> u64 {
    trap_cycle::DEFAULT_RESTART_DELAY_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_restart: default_auto_restart(),
            fill_grace_ms: default_fill_grace_ms(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding `cycles.jsonl`.
    pub data_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/cycles".to_string(),
        }
    }
}

/// One instrument listed on the paper venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperInstrumentConfig {
    pub symbol: String,
    pub point: Price,
    pub digits: u32,
    pub volume_step: Size,
    pub volume_min: Size,
    pub volume_max: Size,
    #[serde(default)]
    pub min_stop_points: u32,
    /// Opening quote.
    pub bid: Price,
    pub ask: Price,
}

impl PaperInstrumentConfig {
    pub fn spec(&self) -> InstrumentSpec {
        InstrumentSpec {
            symbol: self.symbol.clone(),
            point: self.point,
            digits: self.digits,
            volume_step: self.volume_step,
            volume_min: self.volume_min,
            volume_max: self.volume_max,
            min_stop_points: self.min_stop_points,
        }
    }

    pub fn opening_quote(&self) -> Quote {
        Quote::new(self.bid, self.ask)
    }
}

/// Simulated venue and its price feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Close positions when the quote crosses their SL or TP. Default: true.
    #[serde(default = "default_protective_exits")]
    pub protective_exits: bool,
    /// Random-walk step interval (ms). Default: 500.
    #[serde(default = "default_walk_interval_ms")]
    pub walk_interval_ms: u64,
    /// Largest random-walk step, in points. Default: 40.
    #[serde(default = "default_walk_max_points")]
    pub walk_max_points: i64,
    #[serde(default = "default_instruments")]
    pub instruments: Vec<PaperInstrumentConfig>,
}

fn default_protective_exits() -> bool {
    true
}

fn default_walk_interval_ms() -> u64 {
    500
}

fn default_walk_max_points() -> i64 {
    40
}

fn default_instruments() -> Vec<PaperInstrumentConfig> {
    vec![
        PaperInstrumentConfig {
            symbol: "EURUSDc".to_string(),
            point: Price(dec!(0.00001)),
            digits: 5,
            volume_step: Size(dec!(0.01)),
            volume_min: Size(dec!(0.01)),
            volume_max: Size(dec!(200)),
            min_stop_points: 10,
            bid: Price(dec!(1.08500)),
            ask: Price(dec!(1.08512)),
        },
        PaperInstrumentConfig {
            symbol: "XAUUSDm".to_string(),
            point: Price(dec!(0.001)),
            digits: 3,
            volume_step: Size(dec!(0.01)),
            volume_min: Size(dec!(0.01)),
            volume_max: Size(dec!(200)),
            min_stop_points: 0,
            bid: Price(dec!(2350.000)),
            ask: Price(dec!(2350.160)),
        },
        PaperInstrumentConfig {
            symbol: "BTCUSDc".to_string(),
            point: Price(dec!(0.01)),
            digits: 2,
            volume_step: Size(dec!(0.01)),
            volume_min: Size(dec!(0.01)),
            volume_max: Size(dec!(100)),
            min_stop_points: 0,
            bid: Price(dec!(65000.00)),
            ask: Price(dec!(65012.00)),
        },
    ]
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            protective_exits: default_protective_exits(),
            walk_interval_ms: default_walk_interval_ms(),
            walk_max_points: default_walk_max_points(),
            instruments: default_instruments(),
        }
    }
}

fn default_symbols() -> Vec<SymbolConfig> {
    vec![
        SymbolConfig {
            symbol: "EURUSDc".to_string(),
            initial_lot: Size(dec!(0.01)),
            lot_multiplier: dec!(2.5),
            take_profit_pips: dec!(9.5),
            stop_loss_pips: dec!(20.5),
            trigger_distance_pips: dec!(9.5),
            max_levels: 100,
            tag: Tag(67893),
            pip_multiplier: 10,
            always_tradable: false,
            aliases: vec!["eurusd".to_string(), "eur".to_string()],
        },
        SymbolConfig {
            symbol: "XAUUSDm".to_string(),
            initial_lot: Size(dec!(0.01)),
            lot_multiplier: dec!(2.5),
            take_profit_pips: dec!(7.3),
            stop_loss_pips: dec!(15.2),
            trigger_distance_pips: dec!(7.3),
            max_levels: 8,
            tag: Tag(67894),
            pip_multiplier: 1000,
            always_tradable: false,
            aliases: vec!["gold".to_string(), "xau".to_string()],
        },
        SymbolConfig {
            symbol: "BTCUSDc".to_string(),
            initial_lot: Size(dec!(0.01)),
            lot_multiplier: dec!(2.5),
            take_profit_pips: dec!(12),
            stop_loss_pips: dec!(26),
            trigger_distance_pips: dec!(12),
            max_levels: 100,
            tag: Tag(67895),
            pip_multiplier: 1000,
            always_tradable: true,
            aliases: vec!["btc".to_string()],
        },
    ]
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local-time window for starting cycles.
    #[serde(default)]
    pub trading_hours: TradingHours,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<SymbolConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            trading_hours: TradingHours::default(),
            scheduler: SchedulerConfig::default(),
            engine: EngineConfig::default(),
            persistence: PersistenceConfig::default(),
            paper: PaperConfig::default(),
            symbols: default_symbols(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> AppResult<()> {
        let hours = self.trading_hours;
        if hours.start_hour > 24 || hours.end_hour > 24 || hours.start_hour >= hours.end_hour {
            return Err(AppError::Config(format!("invalid trading hours {hours}")));
        }
        if self.scheduler.interval_ms == 0 {
            return Err(AppError::Config("scheduler.interval_ms must be positive".to_string()));
        }
        if self.paper.walk_max_points < 0 {
            return Err(AppError::Config("paper.walk_max_points must not be negative".to_string()));
        }
        if self.symbols.is_empty() {
            return Err(AppError::Config("no symbols configured".to_string()));
        }

        for (i, symbol) in self.symbols.iter().enumerate() {
            symbol
                .validate()
                .map_err(|e| AppError::Config(e.to_string()))?;
            if self.symbols[..i].iter().any(|s| s.symbol == symbol.symbol) {
                return Err(AppError::Config(format!("duplicate symbol {}", symbol.symbol)));
            }
            for alias in &symbol.aliases {
                let clash = self
                    .symbols
                    .iter()
                    .filter(|other| other.symbol != symbol.symbol)
                    .any(|other| other.matches(alias));
                if clash {
                    return Err(AppError::Config(format!(
                        "alias '{alias}' of {} is claimed by another symbol",
                        symbol.symbol
                    )));
                }
            }
            if !self.paper.instruments.iter().any(|i| i.symbol == symbol.symbol) {
                return Err(AppError::Config(format!(
                    "{} has no paper instrument",
                    symbol.symbol
                )));
            }
        }
        Ok(())
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbols.len(), 3);
        assert_eq!(config.trading_hours, TradingHours::default());
        assert!(config.engine.auto_restart);
        assert_eq!(config.scheduler.interval_ms, 1_500);

        let btc = config.symbols.iter().find(|s| s.symbol == "BTCUSDc").unwrap();
        assert!(btc.always_tradable);
        assert!(btc.matches("BTC"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [trading_hours]
            start_hour = 8
            end_hour = 20

            [engine]
            auto_restart = false
            "#,
        )
        .unwrap();

        assert_eq!(config.trading_hours.start_hour, 8);
        assert!(!config.engine.auto_restart);
        assert_eq!(config.engine.fill_grace_ms, 1_000);
        assert_eq!(config.symbols.len(), 3);
    }

    #[test]
    fn test_symbol_override() {
        let config = AppConfig::from_toml(
            r#"
            [[symbols]]
            symbol = "EURUSDc"
            initial_lot = "0.02"
            lot_multiplier = "2"
            take_profit_pips = "10"
            stop_loss_pips = "20"
            trigger_distance_pips = "10"
            max_levels = 5
            tag = 1
            pip_multiplier = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.symbols.len(), 1);
        assert_eq!(config.symbols[0].initial_lot, Size(dec!(0.02)));
        assert!(config.symbols[0].aliases.is_empty());
    }

    #[test]
    fn test_rejects_inverted_trading_hours() {
        let mut config = AppConfig::default();
        config.trading_hours = TradingHours::new(17, 6);
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_alias_clash() {
        let mut config = AppConfig::default();
        config.symbols[1].aliases.push("eur".to_string());
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_symbol_without_instrument() {
        let mut config = AppConfig::default();
        config.paper.instruments.retain(|i| i.symbol != "XAUUSDm");
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.symbols.len(), 3);
    }

    #[test]
    fn test_shipped_default_file_parses() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.symbols.len(), 3);
        assert_eq!(config.paper.instruments.len(), 3);
        assert_eq!(config.symbols[1].max_levels, 8);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("trading_hours"));
        assert!(toml_str.contains("EURUSDc"));
    }
}
