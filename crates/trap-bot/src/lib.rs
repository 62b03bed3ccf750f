//! Multi-symbol trap cycle bot.
//!
//! Main application that orchestrates all components:
//! - Paper venue with a random-walk price feed
//! - Per-symbol cycle engine and reconciliation scheduler
//! - Cycle record persistence
//! - Operator command surface

pub mod app;
pub mod command;
pub mod config;
pub mod error;

pub use app::Application;
pub use command::{Command, ParseError};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
