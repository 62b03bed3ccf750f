//! Broker error types.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Symbol not available at venue: {0}")]
    UnknownSymbol(String),

    #[error("No quote available for {0}")]
    NoQuote(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl BrokerError {
    /// Whether the next scheduler pass may succeed without intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::NoQuote(_))
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
