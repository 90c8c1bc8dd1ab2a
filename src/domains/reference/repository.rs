use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_as, query_scalar, Sqlite, SqlitePool, Transaction};

use crate::domains::reference::types::{
    ReferenceFilter, ReferenceRecord, ReferenceRecordInput, QUERY_LIMIT, REFERENCE_TTL,
};
use crate::errors::{DbError, DomainError, DomainResult};
use crate::validation::Validate;

/// Trait defining reference-data store operations
#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    /// Insert or fully replace a record by `id`.
    async fn upsert(&self, input: &ReferenceRecordInput) -> DomainResult<()>;

    /// Upsert within a caller-owned transaction.
    async fn upsert_with_tx<'t>(
        &self,
        input: &ReferenceRecordInput,
        tx: &mut Transaction<'t, Sqlite>,
    ) -> DomainResult<()>;

    /// Delete every reference row (full reload / section change).
    async fn clear_all(&self) -> DomainResult<u64>;

    /// Query by section code or substring search; name-ordered, capped.
    async fn find(&self, filter: &ReferenceFilter) -> DomainResult<Vec<ReferenceRecord>>;

    /// Delete rows whose `last_updated` is older than `now - ttl`.
    async fn purge_expired(&self, now_ms: i64, ttl: Duration) -> DomainResult<u64>;

    async fn count(&self) -> DomainResult<i64>;
}

/// SQLite implementation of the reference repository
pub struct SqliteReferenceRepository {
    pool: SqlitePool,
}

impl SqliteReferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn bind_upsert<'q>(
        record: &'q ReferenceRecord,
    ) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query(
            "INSERT OR REPLACE INTO customer_data (
                id, account_id, rr_no, consumer_name, consumer_address,
                division, section, sub_division, phase_type,
                previous_final_reading, billed_date, last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.account_id)
        .bind(&record.rr_no)
        .bind(&record.consumer_name)
        .bind(&record.consumer_address)
        .bind(&record.division)
        .bind(&record.section)
        .bind(&record.sub_division)
        .bind(&record.phase_type)
        .bind(&record.previous_final_reading)
        .bind(&record.billed_date)
        .bind(record.last_updated)
    }
}

#[async_trait]
impl ReferenceRepository for SqliteReferenceRepository {
    async fn upsert(&self, input: &ReferenceRecordInput) -> DomainResult<()> {
        input.validate()?;
        let record = input.normalized(Utc::now().timestamp_millis());

        Self::bind_upsert(&record)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

        Ok(())
    }

    async fn upsert_with_tx<'t>(
        &self,
        input: &ReferenceRecordInput,
        tx: &mut Transaction<'t, Sqlite>,
    ) -> DomainResult<()> {
        input.validate()?;
        let record = input.normalized(Utc::now().timestamp_millis());

        Self::bind_upsert(&record)
            .execute(&mut **tx)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

        Ok(())
    }

    async fn clear_all(&self) -> DomainResult<u64> {
        let result = query("DELETE FROM customer_data")
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;
        Ok(result.rows_affected())
    }

    async fn find(&self, filter: &ReferenceFilter) -> DomainResult<Vec<ReferenceRecord>> {
        let rows = match filter {
            ReferenceFilter::Section(code) => {
                query_as::<_, ReferenceRecord>(
                    "SELECT * FROM customer_data
                     WHERE section = ?
                     ORDER BY consumer_name COLLATE NOCASE ASC
                     LIMIT ?",
                )
                .bind(code)
                .bind(QUERY_LIMIT)
                .fetch_all(&self.pool)
                .await
            }
            ReferenceFilter::Search(text) => {
                let pattern = format!("%{}%", text.to_lowercase());
                query_as::<_, ReferenceRecord>(
                    "SELECT * FROM customer_data
                     WHERE lower(account_id) LIKE ?1
                        OR lower(rr_no) LIKE ?1
                        OR lower(consumer_name) LIKE ?1
                     ORDER BY consumer_name COLLATE NOCASE ASC
                     LIMIT ?2",
                )
                .bind(pattern)
                .bind(QUERY_LIMIT)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?;

        Ok(rows)
    }

    async fn purge_expired(&self, now_ms: i64, ttl: Duration) -> DomainResult<u64> {
        let cutoff = now_ms - ttl.as_millis() as i64;
        let result = query("DELETE FROM customer_data WHERE last_updated < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> DomainResult<i64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM customer_data")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?;
        Ok(count)
    }
}
