//! Trading window policy.
//!
//! New cycles (manual or automatic) may only start inside the configured
//! local-time window. The window is `[start_hour, end_hour)`; symbols
//! flagged as always tradable bypass it entirely.

use chrono::{Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Daily trading window in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingHours {
    /// Inclusive start hour (0-23).
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    /// Exclusive end hour (1-24). 24 means until midnight.
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
}

fn default_start_hour() -> u32 {
    6
}

fn default_end_hour() -> u32 {
    17
}

impl Default for TradingHours {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
        }
    }
}

impl TradingHours {
    /// A window covering the whole day.
    pub const ALWAYS: Self = Self {
        start_hour: 0,
        end_hour: 24,
    };

    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    /// Check if the window is open right now (local time).
    #[must_use]
    pub fn is_open_now(&self) -> bool {
        self.is_open_at(Local::now().time())
    }

    /// Check if the window is open at a given local time of day.
    #[must_use]
    pub fn is_open_at(&self, time: NaiveTime) -> bool {
        let hour = time.hour();
        hour >= self.start_hour && hour < self.end_hour
    }

    /// Window check with the per-symbol bypass applied.
    #[must_use]
    pub fn allows_at(&self, time: NaiveTime, always_tradable: bool) -> bool {
        always_tradable || self.is_open_at(time)
    }
}

impl std::fmt::Display for TradingHours {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.start_hour, self.end_hour)
    }
}
