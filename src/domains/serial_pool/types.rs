use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One serial number in the reservable pool.
///
/// A serial is eligible for assignment iff `is_valid && !is_used`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SerialPoolEntry {
    pub serial_number: String,
    pub is_valid: bool,
    pub is_used: bool,
    pub last_updated: i64,
}
