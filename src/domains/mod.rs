pub mod ingestion;
pub mod meter;
pub mod reference;
pub mod serial_pool;
pub mod sync;
