use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domains::meter::repository::MeterRepository;
use crate::domains::meter::types::{
    FailedUnitGroup, NewMeterInput, OldMeterInput, PendingUnit, UnitSide,
};
use crate::domains::sync::client::SessionProvider;
use crate::domains::sync::types::{is_duplicate_error, is_record_not_found_error};
use crate::errors::{DomainResult, ServiceResult};

/// Capture and review operations for meter-replacement records.
pub struct MeterService {
    repo: Arc<dyn MeterRepository>,
    session: Arc<dyn SessionProvider>,
}

impl MeterService {
    pub fn new(repo: Arc<dyn MeterRepository>, session: Arc<dyn SessionProvider>) -> Self {
        Self { repo, session }
    }

    /// Append an old-meter observation, stamped with the session identity.
    pub async fn record_old_meter(&self, mut input: OldMeterInput) -> ServiceResult<i64> {
        if input.created_by.as_deref().unwrap_or("").is_empty() {
            input.created_by = self.session.creator_id();
        }
        let id = self.repo.insert_old(&input).await?;
        Ok(id)
    }

    /// Append a new-meter observation linked to a previously captured old one.
    pub async fn record_new_meter(
        &self,
        mut input: NewMeterInput,
        old_id: Option<i64>,
    ) -> ServiceResult<i64> {
        if input.created_by.as_deref().unwrap_or("").is_empty() {
            input.created_by = self.session.creator_id();
        }
        let id = self.repo.insert_new(&input, old_id).await?;
        Ok(id)
    }

    pub async fn pending_units(&self) -> DomainResult<Vec<PendingUnit>> {
        self.repo.list_pending_units().await
    }

    pub async fn pending_count(&self) -> DomainResult<i64> {
        self.repo.pending_count().await
    }

    /// Consolidated per-account view of actionable upload failures.
    ///
    /// Units whose only error is a stale "record not found" rejection
    /// are dropped; the rest are grouped by account with at most one
    /// old and one new record per group.
    pub async fn failed_units_grouped(&self) -> DomainResult<Vec<FailedUnitGroup>> {
        let units = self.repo.list_failed_units().await?;
        let mut groups: BTreeMap<String, FailedUnitGroup> = BTreeMap::new();

        for unit in units {
            let mut errors: Vec<&str> = Vec::new();
            if let Some(err) = unit.old.upload_error.as_deref() {
                if !err.is_empty() {
                    errors.push(err);
                }
            }
            if let Some(err) = unit.new.as_ref().and_then(|n| n.upload_error.as_deref()) {
                if !err.is_empty() {
                    errors.push(err);
                }
            }
            errors.retain(|e| !is_record_not_found_error(e));
            if errors.is_empty() {
                continue;
            }

            let has_duplicate = errors.iter().any(|e| is_duplicate_error(e));
            let has_generic = errors.iter().any(|e| !is_duplicate_error(e));

            let group = groups
                .entry(unit.old.account_id.clone())
                .or_insert_with(|| FailedUnitGroup {
                    account_id: unit.old.account_id.clone(),
                    old: None,
                    new: None,
                    has_duplicate_error: false,
                    has_generic_error: false,
                });

            if group.old.is_none() {
                group.old = Some(unit.old);
            }
            if group.new.is_none() {
                group.new = unit.new;
            }
            group.has_duplicate_error |= has_duplicate;
            group.has_generic_error |= has_generic;
        }

        Ok(groups.into_values().collect())
    }

    /// Remove one side of a failed unit after the user discards it.
    pub async fn delete_failed_record(&self, id: i64, side: UnitSide) -> DomainResult<()> {
        match side {
            UnitSide::Old => self.repo.delete_old(id).await,
            UnitSide::New => self.repo.delete_new(id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::domains::meter::repository::SqliteMeterRepository;

    struct FixedSession {
        creator: Option<String>,
    }

    impl SessionProvider for FixedSession {
        fn creator_id(&self) -> Option<String> {
            self.creator.clone()
        }

        fn sync_allowed(&self) -> bool {
            true
        }
    }

    async fn service() -> (MeterService, Arc<SqliteMeterRepository>) {
        let db = Database::open_in_memory().await.unwrap();
        let repo = Arc::new(SqliteMeterRepository::new(db.pool().clone()));
        let session = Arc::new(FixedSession {
            creator: Some("tech-42".to_string()),
        });
        (MeterService::new(repo.clone(), session), repo)
    }

    fn old_input(account: &str) -> OldMeterInput {
        OldMeterInput {
            account_id: account.to_string(),
            serial_no_old: Some("SN-1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_record_old_meter_stamps_creator() {
        let (service, repo) = service().await;
        let id = service.record_old_meter(old_input("AC-1")).await.unwrap();

        let record = repo.find_old_by_id(id).await.unwrap();
        assert_eq!(record.created_by, "tech-42");
    }

    #[tokio::test]
    async fn test_explicit_creator_is_kept() {
        let (service, repo) = service().await;
        let mut input = old_input("AC-1");
        input.created_by = Some("supervisor-7".to_string());

        let id = service.record_old_meter(input).await.unwrap();
        let record = repo.find_old_by_id(id).await.unwrap();
        assert_eq!(record.created_by, "supervisor-7");
    }

    #[tokio::test]
    async fn test_duplicate_on_one_side_flags_group() {
        let (service, repo) = service().await;
        let old_id = service.record_old_meter(old_input("AC-1")).await.unwrap();
        service
            .record_new_meter(
                NewMeterInput {
                    account_id: "AC-1".to_string(),
                    ..Default::default()
                },
                Some(old_id),
            )
            .await
            .unwrap();

        // Only the old side was rejected; the new side carries no error.
        repo.mark_failed(old_id, None, "serial number already exists")
            .await
            .unwrap();

        let groups = service.failed_units_grouped().await.unwrap();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.account_id, "AC-1");
        assert!(group.old.is_some());
        assert!(group.new.is_some());
        assert!(group.has_duplicate_error);
        assert!(!group.has_generic_error);
    }

    #[tokio::test]
    async fn test_record_not_found_units_are_filtered() {
        let (service, repo) = service().await;
        let stale = service.record_old_meter(old_input("AC-1")).await.unwrap();
        let real = service.record_old_meter(old_input("AC-2")).await.unwrap();

        repo.mark_failed(stale, None, "Record not found for account")
            .await
            .unwrap();
        repo.mark_failed(real, None, "internal server error")
            .await
            .unwrap();

        let groups = service.failed_units_grouped().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].account_id, "AC-2");
        assert!(groups[0].has_generic_error);
        assert!(!groups[0].has_duplicate_error);
    }

    #[tokio::test]
    async fn test_groups_are_per_account() {
        let (service, repo) = service().await;
        let a1 = service.record_old_meter(old_input("AC-1")).await.unwrap();
        let a2 = service.record_old_meter(old_input("AC-2")).await.unwrap();

        repo.mark_failed(a1, None, "duplicate entry").await.unwrap();
        repo.mark_failed(a2, None, "server error").await.unwrap();

        let groups = service.failed_units_grouped().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].account_id, "AC-1");
        assert_eq!(groups[1].account_id, "AC-2");
    }

    #[tokio::test]
    async fn test_delete_failed_record() {
        let (service, repo) = service().await;
        let old_id = service.record_old_meter(old_input("AC-1")).await.unwrap();
        repo.mark_failed(old_id, None, "duplicate entry").await.unwrap();

        service
            .delete_failed_record(old_id, UnitSide::Old)
            .await
            .unwrap();
        assert!(service.failed_units_grouped().await.unwrap().is_empty());
    }
}
