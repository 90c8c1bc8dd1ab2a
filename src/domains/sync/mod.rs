pub mod client;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod types;

pub use client::{RemoteSyncClient, SessionProvider};
pub use repository::{SqliteSyncMetadataRepository, SyncMetadataRepository};
pub use scheduler::{SchedulerConfig, SyncScheduler};
pub use service::{SyncService, DEFAULT_REQUEST_TIMEOUT};
pub use types::{PushOutcome, SyncStats};
