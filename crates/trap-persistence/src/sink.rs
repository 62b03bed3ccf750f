//! Sink trait for completed cycles.

use std::sync::Arc;

use parking_lot::Mutex;
use trap_core::CycleRecord;

use crate::PersistenceResult;

/// Destination for finished-cycle records.
///
/// Called outside any cycle-state lock; implementations serialize
/// their own writes.
pub trait CycleSink: Send + Sync {
    fn append(&self, record: &CycleRecord) -> PersistenceResult<()>;
}

/// Arc wrapper for CycleSink trait objects.
pub type DynCycleSink = Arc<dyn CycleSink>;

/// Sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryCycleSink {
    records: Mutex<Vec<CycleRecord>>,
}

impl MemoryCycleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<CycleRecord> {
        self.records.lock().clone()
    }
}

impl CycleSink for MemoryCycleSink {
    fn append(&self, record: &CycleRecord) -> PersistenceResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
