use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::domains::ingestion::types::{IngestConfig, IngestOutcome, IngestProgress};
use crate::domains::reference::repository::ReferenceRepository;
use crate::domains::reference::types::ReferenceRecordInput;
use crate::domains::sync::repository::{
    SyncMetadataRepository, KEY_REFERENCE_READY, KEY_REFERENCE_SECTION,
};
use crate::errors::{DbError, DomainError, DomainResult};

/// Loads a fetched reference dataset into the local store in bounded,
/// individually committed chunks.
///
/// At most one run is active per service instance; a second call while
/// one is in flight returns [`IngestOutcome::AlreadyRunning`] without
/// touching the database.
pub struct IngestionService {
    pool: SqlitePool,
    reference_repo: Arc<dyn ReferenceRepository>,
    metadata_repo: Arc<dyn SyncMetadataRepository>,
    config: IngestConfig,
    running: AtomicBool,
}

impl IngestionService {
    pub fn new(
        pool: SqlitePool,
        reference_repo: Arc<dyn ReferenceRepository>,
        metadata_repo: Arc<dyn SyncMetadataRepository>,
        config: IngestConfig,
    ) -> Self {
        Self {
            pool,
            reference_repo,
            metadata_repo,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Ingest raw reference rows fetched for `section`.
    ///
    /// `on_progress` is called once after every committed chunk.
    /// Cancellation is honored at chunk boundaries only, so a cancelled
    /// run never loses rows that were already committed.
    pub async fn ingest<F>(
        &self,
        section: &str,
        rows: Vec<Value>,
        token: &CancellationToken,
        mut on_progress: F,
    ) -> DomainResult<IngestOutcome>
    where
        F: FnMut(&IngestProgress),
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(IngestOutcome::AlreadyRunning);
        }

        let result = self
            .ingest_inner(section, rows, token, &mut on_progress)
            .await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn ingest_inner<F>(
        &self,
        section: &str,
        rows: Vec<Value>,
        token: &CancellationToken,
        on_progress: &mut F,
    ) -> DomainResult<IngestOutcome>
    where
        F: FnMut(&IngestProgress),
    {
        // A section switch invalidates the whole cached dataset.
        let stored_section = self.metadata_repo.get(KEY_REFERENCE_SECTION).await?;
        if stored_section.as_deref() != Some(section) {
            self.reference_repo.clear_all().await?;
            self.metadata_repo.delete(KEY_REFERENCE_READY).await?;
            self.metadata_repo.set(KEY_REFERENCE_SECTION, section).await?;
        }

        let mut progress = IngestProgress {
            total_rows: rows.len(),
            ..Default::default()
        };

        for chunk in rows.chunks(self.config.chunk_size.max(1)) {
            if token.is_cancelled() {
                log::info!(
                    "Ingestion cancelled after {} chunks ({} rows committed)",
                    progress.chunks_done,
                    progress.succeeded
                );
                return Ok(IngestOutcome::Cancelled(progress));
            }

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| DomainError::Database(DbError::Transaction(e.to_string())))?;

            let mut chunk_ok = 0usize;
            for row in chunk {
                match parse_row(row) {
                    Some(input) => match self.reference_repo.upsert_with_tx(&input, &mut tx).await
                    {
                        Ok(()) => chunk_ok += 1,
                        Err(DomainError::Validation(_)) => progress.failed += 1,
                        Err(e) => {
                            // Per-row failures are countable; the rest of
                            // the chunk still gets its chance.
                            log::warn!("Reference row upsert failed: {}", e);
                            progress.failed += 1;
                        }
                    },
                    None => progress.failed += 1,
                }
            }

            tx.commit()
                .await
                .map_err(|e| DomainError::Database(DbError::Transaction(e.to_string())))?;

            progress.succeeded += chunk_ok;
            progress.chunks_done += 1;

            on_progress(&progress);

            // Let other tasks run between chunks.
            tokio::task::yield_now().await;
        }

        // Readiness is only declared for an uncancelled run that wrote
        // something; a cancelled run leaves the previous flag alone.
        if progress.succeeded > 0 {
            self.metadata_repo.set(KEY_REFERENCE_READY, "1").await?;
        }

        log::info!(
            "Ingestion finished: {} ok, {} skipped, {} chunks",
            progress.succeeded,
            progress.failed,
            progress.chunks_done
        );
        Ok(IngestOutcome::Completed(progress))
    }

    /// Drop the whole cached reference dataset and its readiness flag.
    ///
    /// Called after a cancelled load when the caller prefers an empty
    /// store over a mix of old and partially loaded data.
    pub async fn clear_reference_data(&self) -> DomainResult<()> {
        self.reference_repo.clear_all().await?;
        self.metadata_repo.delete(KEY_REFERENCE_READY).await?;
        self.metadata_repo.delete(KEY_REFERENCE_SECTION).await?;
        Ok(())
    }

    /// Whether a reference dataset has been fully ingested for offline use.
    pub async fn is_reference_ready(&self) -> DomainResult<bool> {
        Ok(self
            .metadata_repo
            .get(KEY_REFERENCE_READY)
            .await?
            .as_deref()
            == Some("1"))
    }
}

fn text_field(row: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match row.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce one raw server row into a reference-record input.
///
/// Returns `None` if the row is not an object or lacks a usable
/// identity; numeric readings and dates become their text forms.
fn parse_row(value: &Value) -> Option<ReferenceRecordInput> {
    let row = value.as_object()?;

    let id = text_field(row, "id")?;
    if id.trim().is_empty() {
        return None;
    }
    let account_id = text_field(row, "account_id")?;
    if account_id.trim().is_empty() {
        return None;
    }

    Some(ReferenceRecordInput {
        id,
        account_id: Some(account_id),
        rr_no: text_field(row, "rr_no"),
        consumer_name: text_field(row, "consumer_name"),
        consumer_address: text_field(row, "consumer_address"),
        division: text_field(row, "division"),
        section: text_field(row, "section"),
        sub_division: text_field(row, "sub_division"),
        phase_type: text_field(row, "phase_type"),
        previous_final_reading: text_field(row, "previous_final_reading"),
        billed_date: text_field(row, "billed_date"),
    })
}
