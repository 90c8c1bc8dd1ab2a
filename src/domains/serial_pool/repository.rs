use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_scalar, QueryBuilder, Sqlite, SqlitePool};

use crate::domains::serial_pool::types::SerialPoolEntry;
use crate::domains::sync::repository::KEY_LAST_POOL_SYNC;
use crate::errors::{DbError, DomainError, DomainResult};

/// Trait defining the serial-number pool operations
#[async_trait]
pub trait SerialPoolRepository: Send + Sync {
    /// Replace or extend the pool from a remote snapshot.
    ///
    /// With `full_sync` the existing pool is deleted first; either way the
    /// last-pool-sync timestamp is updated, even for an empty snapshot, so
    /// callers can distinguish "synced, zero available" from "never synced".
    /// Runs as a single transaction: a reader never observes the pool empty
    /// mid-replace. Returns the number of serials written.
    async fn replace_pool(&self, serials: &[String], full_sync: bool) -> DomainResult<u64>;

    /// Bulk delete by membership; no-op on empty input.
    async fn remove_serials(&self, serials: &[String]) -> DomainResult<u64>;

    /// Bulk set `is_used = 1` and refresh `last_updated`; no-op on empty input.
    async fn mark_used(&self, serials: &[String]) -> DomainResult<u64>;

    /// True iff a matching row exists with `is_valid = 1 AND is_used = 0`.
    async fn is_assignable(&self, serial: &str) -> DomainResult<bool>;

    /// All serials meeting the assignability predicate.
    async fn list_assignable(&self) -> DomainResult<Vec<String>>;

    /// Full entry rows, for shell status surfaces.
    async fn list_all(&self) -> DomainResult<Vec<SerialPoolEntry>>;

    /// Last successful pool sync in epoch milliseconds; 0 if never synced.
    async fn last_sync_timestamp(&self) -> DomainResult<i64>;
}

/// SQLite implementation of the serial pool repository
pub struct SqliteSerialPoolRepository {
    pool: SqlitePool,
}

impl SqliteSerialPoolRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SerialPoolRepository for SqliteSerialPoolRepository {
    async fn replace_pool(&self, serials: &[String], full_sync: bool) -> DomainResult<u64> {
        let now = Utc::now().timestamp_millis();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::Database(DbError::Transaction(e.to_string())))?;

        if full_sync {
            query("DELETE FROM unused_meter_serial_numbers")
                .execute(&mut *tx)
                .await
                .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;
        }

        let mut written = 0_u64;
        for serial in serials {
            let serial = serial.trim();
            if serial.is_empty() {
                continue;
            }
            query(
                "INSERT OR REPLACE INTO unused_meter_serial_numbers
                     (serial_number, is_valid, is_used, last_updated)
                 VALUES (?, 1, 0, ?)",
            )
            .bind(serial)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;
            written += 1;
        }

        // Record the sync moment even when the snapshot was empty.
        query(
            "INSERT INTO sync_metadata (key, value, last_updated)
             VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value, last_updated = excluded.last_updated",
        )
        .bind(KEY_LAST_POOL_SYNC)
        .bind(now.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::Database(DbError::Transaction(e.to_string())))?;

        Ok(written)
    }

    async fn remove_serials(&self, serials: &[String]) -> DomainResult<u64> {
        if serials.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM unused_meter_serial_numbers WHERE serial_number IN (");
        let mut separated = builder.separated(", ");
        for serial in serials {
            separated.push_bind(serial);
        }
        separated.push_unseparated(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

        Ok(result.rows_affected())
    }

    async fn mark_used(&self, serials: &[String]) -> DomainResult<u64> {
        if serials.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().timestamp_millis();

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE unused_meter_serial_numbers SET is_used = 1, last_updated = ");
        builder.push_bind(now);
        builder.push(" WHERE serial_number IN (");
        let mut separated = builder.separated(", ");
        for serial in serials {
            separated.push_bind(serial);
        }
        separated.push_unseparated(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

        Ok(result.rows_affected())
    }

    async fn is_assignable(&self, serial: &str) -> DomainResult<bool> {
        let count = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM unused_meter_serial_numbers
             WHERE serial_number = ? AND is_valid = 1 AND is_used = 0",
        )
        .bind(serial)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?;

        Ok(count > 0)
    }

    async fn list_assignable(&self) -> DomainResult<Vec<String>> {
        let serials = query_scalar::<_, String>(
            "SELECT serial_number FROM unused_meter_serial_numbers
             WHERE is_valid = 1 AND is_used = 0
             ORDER BY serial_number ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?;

        Ok(serials)
    }

    async fn list_all(&self) -> DomainResult<Vec<SerialPoolEntry>> {
        let entries = sqlx::query_as::<_, SerialPoolEntry>(
            "SELECT * FROM unused_meter_serial_numbers ORDER BY serial_number ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?;

        Ok(entries)
    }

    async fn last_sync_timestamp(&self) -> DomainResult<i64> {
        let value = query_scalar::<_, String>("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(KEY_LAST_POOL_SYNC)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?;

        Ok(value.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
    }
}
