use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domains::ingestion::service::IngestionService;
use crate::domains::ingestion::types::{IngestOutcome, IngestProgress};
use crate::domains::meter::repository::MeterRepository;
use crate::domains::serial_pool::repository::SerialPoolRepository;
use crate::domains::sync::client::RemoteSyncClient;
use crate::domains::sync::types::{is_duplicate_error, PushOutcome, SyncStats};
use crate::errors::{DomainError, ServiceError, ServiceResult, SyncError, SyncResult};

/// Bounded wait applied to every remote call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Orchestrates one sync pass: uploading captured units, refreshing the
/// serial pool, and loading reference datasets.
pub struct SyncService {
    client: Arc<dyn RemoteSyncClient>,
    meter_repo: Arc<dyn MeterRepository>,
    serial_repo: Arc<dyn SerialPoolRepository>,
    ingestion: Arc<IngestionService>,
    request_timeout: Duration,
}

impl SyncService {
    pub fn new(
        client: Arc<dyn RemoteSyncClient>,
        meter_repo: Arc<dyn MeterRepository>,
        serial_repo: Arc<dyn SerialPoolRepository>,
        ingestion: Arc<IngestionService>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            meter_repo,
            serial_repo,
            ingestion,
            request_timeout,
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = SyncResult<T>>,
    ) -> SyncResult<T> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    /// Push every pending unit, oldest first.
    ///
    /// Server rejections are recorded against the unit; transport
    /// failures leave the unit untouched so the next pass retries it.
    pub async fn push_pending(&self) -> ServiceResult<SyncStats> {
        let units = self.meter_repo.list_pending_units().await?;
        let mut stats = SyncStats::default();

        for unit in &units {
            let new_id = unit.new.as_ref().map(|n| n.id);
            match self.with_timeout(self.client.push_unit(unit)).await {
                Ok(PushOutcome::Acked) => {
                    self.meter_repo.mark_uploaded(unit.old.id, new_id).await?;
                    stats.uploaded += 1;
                }
                Ok(PushOutcome::Rejected {
                    message,
                    is_duplicate,
                }) => {
                    // Keep the server's explicit duplicate marker legible in
                    // the stored text when the message itself carries no
                    // recognizable duplicate phrase.
                    let stored = if is_duplicate && !is_duplicate_error(&message) {
                        format!("duplicate: {}", message)
                    } else {
                        message
                    };
                    self.meter_repo
                        .mark_failed(unit.old.id, new_id, &stored)
                        .await?;
                    stats.rejected += 1;
                }
                Err(e) => {
                    log::warn!(
                        "Push deferred for account {}: {}",
                        unit.old.account_id,
                        e
                    );
                    stats.deferred += 1;
                }
            }
        }

        if stats.attempted() > 0 {
            log::info!(
                "Push pass: {} uploaded, {} rejected, {} deferred",
                stats.uploaded,
                stats.rejected,
                stats.deferred
            );
        }
        Ok(stats)
    }

    /// Refresh the serial-number pool from the remote snapshot.
    pub async fn sync_serial_pool(&self, full_sync: bool) -> ServiceResult<u64> {
        let serials = self
            .with_timeout(self.client.fetch_serial_pool())
            .await
            .map_err(|e| ServiceError::Domain(DomainError::Sync(e)))?;
        let written = self.serial_repo.replace_pool(&serials, full_sync).await?;
        Ok(written)
    }

    /// Fetch and ingest the reference dataset for one section.
    pub async fn load_reference_dataset<F>(
        &self,
        section: &str,
        token: &CancellationToken,
        on_progress: F,
    ) -> ServiceResult<IngestOutcome>
    where
        F: FnMut(&IngestProgress),
    {
        let rows = self
            .with_timeout(self.client.fetch_reference_dataset(section))
            .await
            .map_err(|e| ServiceError::Domain(DomainError::Sync(e)))?;
        let outcome = self
            .ingestion
            .ingest(section, rows, token, on_progress)
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::domains::ingestion::types::IngestConfig;
    use crate::domains::meter::repository::SqliteMeterRepository;
    use crate::domains::meter::types::{OldMeterInput, PendingUnit};
    use crate::domains::reference::repository::SqliteReferenceRepository;
    use crate::domains::serial_pool::repository::SqliteSerialPoolRepository;
    use crate::domains::sync::repository::SqliteSyncMetadataRepository;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted remote: maps account id to a verdict, counts pushes.
    struct ScriptedClient {
        verdicts: HashMap<String, SyncResult<PushOutcome>>,
        pool: Vec<String>,
        reference_rows: Vec<serde_json::Value>,
        pushed: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                verdicts: HashMap::new(),
                pool: Vec::new(),
                reference_rows: Vec::new(),
                pushed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteSyncClient for ScriptedClient {
        async fn fetch_reference_dataset(
            &self,
            _section: &str,
        ) -> SyncResult<Vec<serde_json::Value>> {
            Ok(self.reference_rows.clone())
        }

        async fn fetch_serial_pool(&self) -> SyncResult<Vec<String>> {
            Ok(self.pool.clone())
        }

        async fn push_unit(&self, unit: &PendingUnit) -> SyncResult<PushOutcome> {
            self.pushed
                .lock()
                .unwrap()
                .push(unit.old.account_id.clone());
            match self.verdicts.get(&unit.old.account_id) {
                Some(verdict) => verdict.clone(),
                None => Ok(PushOutcome::Acked),
            }
        }
    }

    /// Remote that never answers; every call hangs until the timeout.
    struct UnresponsiveClient;

    #[async_trait]
    impl RemoteSyncClient for UnresponsiveClient {
        async fn fetch_reference_dataset(
            &self,
            _section: &str,
        ) -> SyncResult<Vec<serde_json::Value>> {
            std::future::pending().await
        }

        async fn fetch_serial_pool(&self) -> SyncResult<Vec<String>> {
            std::future::pending().await
        }

        async fn push_unit(&self, _unit: &PendingUnit) -> SyncResult<PushOutcome> {
            std::future::pending().await
        }
    }

    struct Fixture {
        service: SyncService,
        meter_repo: Arc<SqliteMeterRepository>,
        serial_repo: Arc<SqliteSerialPoolRepository>,
    }

    async fn fixture(client: ScriptedClient) -> Fixture {
        fixture_with(Arc::new(client)).await
    }

    async fn fixture_with(client: Arc<dyn RemoteSyncClient>) -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let meter_repo = Arc::new(SqliteMeterRepository::new(db.pool().clone()));
        let serial_repo = Arc::new(SqliteSerialPoolRepository::new(db.pool().clone()));
        let reference = Arc::new(SqliteReferenceRepository::new(db.pool().clone()));
        let metadata = Arc::new(SqliteSyncMetadataRepository::new(db.pool().clone()));
        let ingestion = Arc::new(IngestionService::new(
            db.pool().clone(),
            reference,
            metadata,
            IngestConfig::default(),
        ));
        let service = SyncService::new(
            client,
            meter_repo.clone(),
            serial_repo.clone(),
            ingestion,
            DEFAULT_REQUEST_TIMEOUT,
        );
        Fixture {
            service,
            meter_repo,
            serial_repo,
        }
    }

    fn old_input(account: &str) -> OldMeterInput {
        OldMeterInput {
            account_id: account.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_push_marks_acked_units_uploaded() {
        let f = fixture(ScriptedClient::new()).await;
        f.meter_repo.insert_old(&old_input("AC-1")).await.unwrap();
        f.meter_repo.insert_old(&old_input("AC-2")).await.unwrap();

        let stats = f.service.push_pending().await.unwrap();
        assert_eq!(stats.uploaded, 2);
        assert_eq!(stats.rejected, 0);
        assert_eq!(f.meter_repo.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_push_records_rejection_text() {
        let mut client = ScriptedClient::new();
        client.verdicts.insert(
            "AC-1".to_string(),
            Ok(PushOutcome::Rejected {
                message: "serial number already exists".to_string(),
                is_duplicate: true,
            }),
        );
        let f = fixture(client).await;
        let old_id = f.meter_repo.insert_old(&old_input("AC-1")).await.unwrap();

        let stats = f.service.push_pending().await.unwrap();
        assert_eq!(stats.rejected, 1);

        let record = f.meter_repo.find_old_by_id(old_id).await.unwrap();
        assert!(!record.is_uploaded);
        assert_eq!(
            record.upload_error.as_deref(),
            Some("serial number already exists")
        );
    }

    #[tokio::test]
    async fn test_duplicate_marker_survives_opaque_message() {
        let mut client = ScriptedClient::new();
        client.verdicts.insert(
            "AC-1".to_string(),
            Ok(PushOutcome::Rejected {
                message: "constraint violation 4091".to_string(),
                is_duplicate: true,
            }),
        );
        let f = fixture(client).await;
        let old_id = f.meter_repo.insert_old(&old_input("AC-1")).await.unwrap();

        f.service.push_pending().await.unwrap();

        let record = f.meter_repo.find_old_by_id(old_id).await.unwrap();
        let stored = record.upload_error.unwrap();
        assert!(crate::domains::sync::types::is_duplicate_error(&stored));
        assert!(stored.contains("constraint violation 4091"));
    }

    #[tokio::test]
    async fn test_push_timeout_defers_unit() {
        // The fixture and the trailing assertions drive SQLite on a
        // background thread; the clock is paused only around the timed
        // push so auto-advanced time cannot starve the pool acquire.
        let f = fixture_with(Arc::new(UnresponsiveClient)).await;
        let old_id = f.meter_repo.insert_old(&old_input("AC-1")).await.unwrap();

        // Let sqlx's spawned return-to-pool task finish before pausing, so
        // the read inside push_pending acquires its connection without
        // parking on the acquire-timeout timer.
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::time::pause();
        let stats = f.service.push_pending().await.unwrap();
        tokio::time::resume();
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.uploaded, 0);
        assert_eq!(stats.rejected, 0);

        // An elapsed timeout is a transport failure: the unit stays
        // pending with no rejection text recorded.
        let record = f.meter_repo.find_old_by_id(old_id).await.unwrap();
        assert!(!record.is_uploaded);
        assert!(record.upload_error.is_none());
        assert_eq!(f.meter_repo.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_unit_pending() {
        let mut client = ScriptedClient::new();
        client.verdicts.insert(
            "AC-1".to_string(),
            Err(SyncError::Network("connection refused".to_string())),
        );
        let f = fixture(client).await;
        let old_id = f.meter_repo.insert_old(&old_input("AC-1")).await.unwrap();

        let stats = f.service.push_pending().await.unwrap();
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.uploaded, 0);

        // No error text is recorded for a failure that never reached the server.
        let record = f.meter_repo.find_old_by_id(old_id).await.unwrap();
        assert!(!record.is_uploaded);
        assert!(record.upload_error.is_none());
    }

    #[tokio::test]
    async fn test_sync_serial_pool_replaces_snapshot() {
        let mut client = ScriptedClient::new();
        client.pool = vec!["SN-1".to_string(), "SN-2".to_string()];
        let f = fixture(client).await;

        let written = f.service.sync_serial_pool(true).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            f.serial_repo.list_assignable().await.unwrap(),
            vec!["SN-1".to_string(), "SN-2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_load_reference_dataset_ingests_rows() {
        let mut client = ScriptedClient::new();
        client.reference_rows = vec![
            json!({ "id": "C-1", "account_id": "AC-1", "consumer_name": "Asha" }),
            json!({ "id": "C-2", "account_id": "AC-2", "consumer_name": "Bhavana" }),
        ];
        let f = fixture(client).await;
        let token = CancellationToken::new();

        let outcome = f
            .service
            .load_reference_dataset("S1", &token, |_| {})
            .await
            .unwrap();
        match outcome {
            IngestOutcome::Completed(p) => assert_eq!(p.succeeded, 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
