//! Completed-cycle persistence for trapcycle.
//!
//! Every finished cycle produces exactly one `CycleRecord`, appended to a
//! `CycleSink`. The production sink is an append-only JSON Lines file.

pub mod error;
pub mod sink;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use sink::{CycleSink, DynCycleSink, MemoryCycleSink};
pub use writer::JsonLinesCycleWriter;
