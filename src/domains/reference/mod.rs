pub mod repository;
pub mod types;

pub use repository::{ReferenceRepository, SqliteReferenceRepository};
pub use types::{ReferenceFilter, ReferenceRecord, ReferenceRecordInput, REFERENCE_TTL};
