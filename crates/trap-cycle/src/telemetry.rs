//! Per-cycle tracking record.
//!
//! Created when L0 is confirmed, incremented on every identified fill,
//! consumed exactly once when the cycle ends.

use chrono::{DateTime, Utc};
use trap_core::{CycleOutcome, CycleRecord, OrderSide};
use uuid::Uuid;

/// Live bookkeeping for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleTrackingRecord {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Confirmed levels, L0 included.
    pub traps: u32,
    pub l0_side: OrderSide,
}

impl CycleTrackingRecord {
    /// Begin tracking a cycle whose L0 was just confirmed.
    pub fn begin(l0_side: OrderSide, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at,
            traps: 1,
            l0_side,
        }
    }

    pub fn record_level(&mut self) {
        self.traps += 1;
    }

    /// Consume into the persisted record.
    pub fn finish(self, symbol: &str, outcome: CycleOutcome, ended_at: DateTime<Utc>) -> CycleRecord {
        let duration = ended_at - self.started_at;
        let duration_secs = duration
            .num_microseconds()
            .map(|us| us as f64 / 1_000_000.0)
            .unwrap_or_else(|| duration.num_seconds() as f64);
        CycleRecord {
            logged_at: Utc::now(),
            symbol: symbol.to_string(),
            cycle_id: self.cycle_id,
            started_at: self.started_at,
            ended_at,
            duration_secs: duration_secs.max(0.0),
            traps: self.traps,
            l0_direction: self.l0_side,
            outcome,
        }
    }
}
