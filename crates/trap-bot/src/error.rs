//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(#[from] trap_broker::BrokerError),

    #[error("Cycle error: {0}")]
    Cycle(#[from] trap_cycle::CycleError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] trap_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] trap_persistence::PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
