//! Broker gateway for the trapcycle bot.
//!
//! - `BrokerGateway`: every venue operation the cycle engine needs
//! - `PaperBroker`: in-memory venue used in paper mode and in tests

pub mod error;
pub mod gateway;
pub mod paper;

pub use error::{BrokerError, BrokerResult};
pub use gateway::{
    BoxFuture, BrokerGateway, DynBrokerGateway, MarketFill, MarketOrderRequest, StopOrderRequest,
};
pub use paper::{BrokerCall, FillLinkage, PaperBroker, PaperConfig};
