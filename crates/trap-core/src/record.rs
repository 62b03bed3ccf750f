//! Completed-cycle records.

use crate::OrderSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleOutcome {
    /// A take-profit was crossed.
    Win,
    /// All positions disappeared with nothing pending.
    ConcludedByReset,
    /// Operator close-all, or the orphaned-pending sweep.
    #[serde(rename = "MANUAL_CLOSEALL")]
    ManualCloseAll,
    /// Process stopped while the cycle was live.
    ShutdownInterrupt,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "WIN",
            Self::ConcludedByReset => "CONCLUDED_BY_RESET",
            Self::ManualCloseAll => "MANUAL_CLOSEALL",
            Self::ShutdownInterrupt => "SHUTDOWN_INTERRUPT",
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished cycle, as appended to the telemetry sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub logged_at: DateTime<Utc>,
    pub symbol: String,
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Confirmed levels, L0 included.
    pub traps: u32,
    pub l0_direction: OrderSide,
    pub outcome: CycleOutcome,
}
