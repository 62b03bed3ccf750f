//! Trap cycle core.
//!
//! - `SymbolStateStore`: per-symbol cycle state behind one lock
//! - `CascadePlanner`: placement of the next trap
//! - `FillResolver` / `reconcile`: venue truth vs. tracked state
//! - `RestartPolicy`: biased auto-restart after a cycle ends
//! - `CycleEngine`: the per-symbol state machine
//! - `CycleScheduler`: fixed-cadence driver

pub mod engine;
pub mod error;
pub mod planner;
pub mod reconcile;
pub mod resolver;
pub mod restart;
pub mod scheduler;
pub mod store;
pub mod telemetry;

pub use engine::{
    CycleEngine, CycleStarted, CycleStatus, EngineSettings, LocalClock, PassOutcome,
    DEFAULT_RESTART_DELAY_MS,
};
pub use error::{CycleError, CycleResult};
pub use planner::{CascadePlanner, PendingPlan, ProtectiveLevels};
pub use reconcile::{PendingStatus, Termination};
pub use resolver::{Attribution, FillResolution, FillResolver, HEURISTIC_TOLERANCE_MS};
pub use restart::{RestartDecision, RestartPolicy, RestartSkip, FAVORED_PROBABILITY};
pub use scheduler::{CycleScheduler, TickReport, DEFAULT_INTERVAL_MS};
pub use store::{CyclePhase, CycleState, LevelBasis, PendingSlot, SymbolStateStore};
pub use telemetry::CycleTrackingRecord;
