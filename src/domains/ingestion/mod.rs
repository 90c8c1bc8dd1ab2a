pub mod service;
pub mod types;

pub use service::IngestionService;
pub use types::{IngestConfig, IngestOutcome, IngestProgress, DEFAULT_CHUNK_SIZE};
