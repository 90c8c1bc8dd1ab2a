use serde::{Deserialize, Serialize};

/// Default number of rows committed per transaction during ingestion.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    pub chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Running totals reported after each committed chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestProgress {
    pub total_rows: usize,
    pub succeeded: usize,
    /// Rows skipped because they were malformed or failed validation.
    pub failed: usize,
    pub chunks_done: usize,
}

/// Terminal state of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Completed(IngestProgress),
    /// Stopped at a chunk boundary; committed chunks are kept.
    Cancelled(IngestProgress),
    /// Another ingestion run already holds the guard; nothing was done.
    AlreadyRunning,
}
