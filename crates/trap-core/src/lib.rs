//! Core domain types for the trapcycle bot.
//!
//! This crate provides the types shared by every other crate:
//! - `Price`, `Size`: precision-safe numeric types
//! - `OrderSide`, `PositionId`, `OrderId`, `Tag`: order identity
//! - `InstrumentSpec`: venue constraints and lot normalization
//! - `Quote`, `PositionSnapshot`, `OrderSnapshot`: venue projections
//! - `SymbolConfig`, `TradingHours`: static trading parameters
//! - `CycleOutcome`, `CycleRecord`: finished-cycle telemetry

pub mod config;
pub mod decimal;
pub mod error;
pub mod instrument;
pub mod order;
pub mod record;
pub mod trading_session;
pub mod venue;

pub use config::SymbolConfig;
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use instrument::{normalize_lot, InstrumentSpec};
pub use order::{order_comment, OrderId, OrderSide, PositionId, Tag};
pub use record::{CycleOutcome, CycleRecord};
pub use trading_session::TradingHours;
pub use venue::{OrderLifecycle, OrderSnapshot, PositionSnapshot, Quote, TradeSnapshot};
