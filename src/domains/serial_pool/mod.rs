pub mod repository;
pub mod types;

pub use repository::{SerialPoolRepository, SqliteSerialPoolRepository};
pub use types::SerialPoolEntry;
