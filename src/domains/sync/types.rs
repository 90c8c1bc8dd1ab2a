use serde::{Deserialize, Serialize};

/// Server verdict for one pushed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The server accepted the unit.
    Acked,
    /// The server rejected the unit; the raw message is stored locally.
    Rejected { message: String, is_duplicate: bool },
}

/// Counters for a single sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub uploaded: i64,
    pub rejected: i64,
    /// Transport failures; the affected units stay pending for retry.
    pub deferred: i64,
}

impl SyncStats {
    pub fn attempted(&self) -> i64 {
        self.uploaded + self.rejected + self.deferred
    }
}

/// Duplicate rejections mean the data already reached the server, so
/// they are surfaced differently from other failures in the review UI.
pub fn is_duplicate_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("already exists")
        || lower.contains("already been taken")
        || lower.contains("duplicate")
}

/// Stale rejections referencing records the server no longer knows
/// about; these units are not actionable and are hidden from review.
pub fn is_record_not_found_error(error: &str) -> bool {
    error.to_lowercase().contains("record not found")
}
