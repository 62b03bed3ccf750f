//! JSON Lines writer for completed cycles.
//!
//! Each line is a complete `CycleRecord`, so an interrupted write only
//! affects the last line. The directory and file are created on first
//! append; existing content is never truncated.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use trap_core::CycleRecord;

use crate::error::{PersistenceError, PersistenceResult};
use crate::sink::CycleSink;

const FILE_NAME: &str = "cycles.jsonl";

/// Append-only JSON Lines sink.
pub struct JsonLinesCycleWriter {
    path: PathBuf,
    /// Opened lazily on first append.
    active: Mutex<Option<BufWriter<File>>>,
}

impl JsonLinesCycleWriter {
    /// Create a writer targeting `<base_dir>/cycles.jsonl`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            path: base_dir.as_ref().join(FILE_NAME),
            active: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> PersistenceResult<BufWriter<File>> {
        let opened = match self.path.parent() {
            Some(dir) => std::fs::create_dir_all(dir),
            None => Ok(()),
        }
        .and_then(|()| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
        });
        let file = opened.map_err(|source| PersistenceError::Open {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "Opened cycle log (append mode)");
        Ok(BufWriter::new(file))
    }

    /// Flush buffered lines to disk.
    pub fn flush(&self) -> PersistenceResult<()> {
        if let Some(writer) = self.active.lock().as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl CycleSink for JsonLinesCycleWriter {
    fn append(&self, record: &CycleRecord) -> PersistenceResult<()> {
        let json = serde_json::to_string(record)?;
        let mut active = self.active.lock();
        if active.is_none() {
            *active = Some(self.open()?);
        }
        if let Some(writer) = active.as_mut() {
            writeln!(writer, "{json}")?;
            writer.flush()?;
        }
        debug!(
            symbol = %record.symbol,
            cycle_id = %record.cycle_id,
            outcome = %record.outcome,
            "Cycle record written"
        );
        Ok(())
    }
}

impl Drop for JsonLinesCycleWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush cycle log on drop");
        }
    }
}
