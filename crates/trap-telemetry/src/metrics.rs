//! Prometheus metrics for the cycle lifecycle.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_gauge_vec, CounterVec, Encoder,
    Histogram, IntGaugeVec, TextEncoder,
};

use crate::error::TelemetryResult;

/// Cycles started (L0 confirmed).
pub static CYCLES_STARTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trap_cycles_started_total",
        "Total cycles started",
        &["symbol", "side"]
    )
    .unwrap()
});

/// Cycles finalized, by outcome.
pub static CYCLES_RESOLVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trap_cycles_resolved_total",
        "Total cycles finalized",
        &["symbol", "outcome"]
    )
    .unwrap()
});

/// Fill-driven levels identified.
pub static LEVELS_CONFIRMED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trap_levels_confirmed_total",
        "Total cascade levels confirmed from pending fills",
        &["symbol"]
    )
    .unwrap()
});

/// Pending stop orders accepted by the venue.
pub static PENDING_PLACED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trap_pending_placed_total",
        "Total pending stop orders placed",
        &["symbol"]
    )
    .unwrap()
});

/// Filled pending orders whose position could not be attributed.
pub static FILL_UNIDENTIFIED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trap_fill_unidentified_total",
        "Filled pending orders left unattributed",
        &["symbol", "kind"]
    )
    .unwrap()
});

/// Errors caught at the per-symbol boundary.
pub static SYMBOL_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trap_symbol_errors_total",
        "Errors contained at the per-symbol processing boundary",
        &["symbol"]
    )
    .unwrap()
});

/// Current level per symbol (-1 when idle).
pub static CURRENT_LEVEL: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "trap_current_level",
        "Current cascade level (-1 when idle)",
        &["symbol"]
    )
    .unwrap()
});

/// Scheduler tick duration.
pub static TICK_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "trap_tick_duration_ms",
        "Scheduler tick duration in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn cycle_started(symbol: &str, side: &str) {
        CYCLES_STARTED_TOTAL.with_label_values(&[symbol, side]).inc();
        CURRENT_LEVEL.with_label_values(&[symbol]).set(0);
    }

    pub fn cycle_resolved(symbol: &str, outcome: &str) {
        CYCLES_RESOLVED_TOTAL
            .with_label_values(&[symbol, outcome])
            .inc();
        CURRENT_LEVEL.with_label_values(&[symbol]).set(-1);
    }

    pub fn level_confirmed(symbol: &str, level: u32) {
        LEVELS_CONFIRMED_TOTAL.with_label_values(&[symbol]).inc();
        CURRENT_LEVEL
            .with_label_values(&[symbol])
            .set(i64::from(level));
    }

    pub fn pending_placed(symbol: &str) {
        PENDING_PLACED_TOTAL.with_label_values(&[symbol]).inc();
    }

    /// `kind` is `ambiguous` or `not_found`.
    pub fn fill_unidentified(symbol: &str, kind: &str) {
        FILL_UNIDENTIFIED_TOTAL
            .with_label_values(&[symbol, kind])
            .inc();
    }

    pub fn symbol_error(symbol: &str) {
        SYMBOL_ERRORS_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn tick_duration(duration_ms: f64) {
        TICK_DURATION_MS.observe(duration_ms);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_counters() {
        Metrics::cycle_started("TESTSYM", "BUY");
        Metrics::level_confirmed("TESTSYM", 2);
        assert_eq!(CURRENT_LEVEL.with_label_values(&["TESTSYM"]).get(), 2);

        Metrics::cycle_resolved("TESTSYM", "WIN");
        assert_eq!(CURRENT_LEVEL.with_label_values(&["TESTSYM"]).get(), -1);
        assert!(
            CYCLES_RESOLVED_TOTAL
                .with_label_values(&["TESTSYM", "WIN"])
                .get()
                >= 1.0
        );
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        Metrics::pending_placed("RENDERSYM");
        let text = Metrics::render().unwrap();
        assert!(text.contains("trap_pending_placed_total"));
    }
}
