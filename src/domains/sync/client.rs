use async_trait::async_trait;

use crate::domains::meter::types::PendingUnit;
use crate::domains::sync::types::PushOutcome;
use crate::errors::SyncResult;

/// Transport-level access to the remote system.
///
/// The shell application provides the concrete implementation; the core
/// only depends on this trait so sync logic is testable offline.
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
    /// Fetch the reference dataset for one section as raw records.
    async fn fetch_reference_dataset(
        &self,
        section: &str,
    ) -> SyncResult<Vec<serde_json::Value>>;

    /// Fetch the current assignable serial-number pool.
    async fn fetch_serial_pool(&self) -> SyncResult<Vec<String>>;

    /// Push one meter-replacement unit and report the server's verdict.
    ///
    /// Transport failures surface as `Err`; a reachable server that
    /// refuses the unit surfaces as `Ok(PushOutcome::Rejected { .. })`.
    async fn push_unit(&self, unit: &PendingUnit) -> SyncResult<PushOutcome>;
}

/// Session state supplied by the shell application.
pub trait SessionProvider: Send + Sync {
    /// Identity stamped onto records created on this device.
    fn creator_id(&self) -> Option<String>;

    /// Whether background sync may run right now (logged in, not in a
    /// blocking flow such as initial setup).
    fn sync_allowed(&self) -> bool;
}
