//! Cycle error types.

use thiserror::Error;
use trap_broker::BrokerError;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Fill could not be attributed: {0}")]
    IdentificationAmbiguous(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Venue error: {0}")]
    Venue(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Cycle already active for {0}")]
    AlreadyActive(String),

    #[error("Outside trading hours for {0}")]
    OutsideTradingHours(String),

    #[error("Invalid lot: {0}")]
    InvalidLot(String),

    #[error("Shutting down, {0} not started")]
    ShuttingDown(String),
}

pub type CycleResult<T> = Result<T, CycleError>;

impl CycleError {
    /// A later pass may succeed without operator action.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

impl From<BrokerError> for CycleError {
    fn from(e: BrokerError) -> Self {
        if e.is_transient() {
            return Self::Connectivity(e.to_string());
        }
        match e {
            BrokerError::OrderRejected(msg) => Self::OrderRejected(msg),
            BrokerError::UnknownSymbol(symbol) => Self::ConfigurationMissing(symbol),
            other => Self::Venue(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_errors_map_onto_taxonomy() {
        let err = CycleError::from(BrokerError::NoQuote("EURUSDc".to_string()));
        assert!(err.is_transient());

        let err = CycleError::from(BrokerError::UnknownSymbol("XAUUSDm".to_string()));
        assert!(matches!(err, CycleError::ConfigurationMissing(ref s) if s == "XAUUSDm"));

        let err = CycleError::from(BrokerError::OrderRejected("invalid stops".to_string()));
        assert!(matches!(err, CycleError::OrderRejected(_)));
        assert!(!err.is_transient());
    }
}
