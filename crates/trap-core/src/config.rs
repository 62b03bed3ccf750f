//! Per-symbol cycle parameters.

use crate::{CoreError, Result, Size, Tag};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Static trading parameters for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    pub initial_lot: Size,
    pub lot_multiplier: Decimal,
    pub take_profit_pips: Decimal,
    pub stop_loss_pips: Decimal,
    pub trigger_distance_pips: Decimal,
    /// Maximum open positions per cycle.
    pub max_levels: u32,
    pub tag: Tag,
    /// Pip-to-point scale (10 for 5-digit FX, 1000 for gold/crypto quotes).
    pub pip_multiplier: u32,
    /// Bypass the global trading window.
    #[serde(default)]
    pub always_tradable: bool,
    /// Operator shorthands, matched case-insensitively.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl SymbolConfig {
    /// Reject parameter sets the cycle cannot run with.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.symbol.trim().is_empty() {
            Some("symbol name is empty")
        } else if !self.initial_lot.is_positive() {
            Some("initial_lot must be positive")
        } else if self.lot_multiplier <= Decimal::ZERO {
            Some("lot_multiplier must be positive")
        } else if self.trigger_distance_pips <= Decimal::ZERO {
            Some("trigger_distance_pips must be positive")
        } else if self.take_profit_pips < Decimal::ZERO || self.stop_loss_pips < Decimal::ZERO {
            Some("take_profit_pips and stop_loss_pips must not be negative")
        } else if self.max_levels == 0 {
            Some("max_levels must be at least 1")
        } else if self.pip_multiplier == 0 {
            Some("pip_multiplier must be at least 1")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(CoreError::InvalidSymbolConfig {
                symbol: self.symbol.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Whether `name` is this symbol or one of its aliases.
    pub fn matches(&self, name: &str) -> bool {
        self.symbol == name || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}
