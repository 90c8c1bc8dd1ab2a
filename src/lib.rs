//! Offline-first core for field meter-replacement work.
//!
//! The crate owns the local SQLite store and everything that moves data
//! in and out of it: the cached reference dataset, the assignable
//! serial-number pool, the capture queue for old/new meter records, and
//! the background sync passes that reconcile all of it with the remote
//! system. Network transport and session state stay behind the
//! [`domains::sync::RemoteSyncClient`] and
//! [`domains::sync::SessionProvider`] traits so the shell application
//! supplies them.

pub mod database;
pub mod domains;
pub mod errors;
pub mod validation;

pub use database::{Database, SharedDatabase};
pub use domains::ingestion::{IngestConfig, IngestOutcome, IngestProgress, IngestionService};
pub use domains::meter::{
    FailedUnitGroup, MeterService, NewMeterInput, OldMeterInput, PendingUnit, SqliteMeterRepository,
    UnitSide,
};
pub use domains::reference::{ReferenceFilter, ReferenceRecord, SqliteReferenceRepository};
pub use domains::serial_pool::{SerialPoolEntry, SqliteSerialPoolRepository};
pub use domains::sync::{
    RemoteSyncClient, SchedulerConfig, SessionProvider, SqliteSyncMetadataRepository, SyncScheduler,
    SyncService, SyncStats,
};

/// Initialize env_logger once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
