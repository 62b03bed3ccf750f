//! Prometheus metrics and structured logging for trapcycle.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus counters for the cycle lifecycle

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
