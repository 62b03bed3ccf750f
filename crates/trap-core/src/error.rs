//! Error types for trap-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid configuration for '{symbol}': {reason}")]
    InvalidSymbolConfig { symbol: String, reason: &'static str },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
