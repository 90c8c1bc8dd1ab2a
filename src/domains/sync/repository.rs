use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_scalar, SqlitePool};

use crate::errors::{DbError, DomainError, DomainResult};

/// Epoch-millisecond timestamp of the last successful serial-pool sync.
pub const KEY_LAST_POOL_SYNC: &str = "last_pool_sync";
/// "1" once at least one reference chunk has been committed locally.
pub const KEY_REFERENCE_READY: &str = "reference_ready";
/// Section code the current reference dataset was loaded for.
pub const KEY_REFERENCE_SECTION: &str = "reference_section";

/// Trait defining key-value sync bookkeeping operations
#[async_trait]
pub trait SyncMetadataRepository: Send + Sync {
    async fn get(&self, key: &str) -> DomainResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> DomainResult<()>;

    async fn delete(&self, key: &str) -> DomainResult<()>;
}

/// SQLite implementation of the sync metadata repository
pub struct SqliteSyncMetadataRepository {
    pool: SqlitePool,
}

impl SqliteSyncMetadataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncMetadataRepository for SqliteSyncMetadataRepository {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        let value = query_scalar::<_, String>("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> DomainResult<()> {
        let now = Utc::now().timestamp_millis();
        query(
            "INSERT INTO sync_metadata (key, value, last_updated) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                 last_updated = excluded.last_updated",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        query("DELETE FROM sync_metadata WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[tokio::test]
    async fn test_set_get_overwrite_delete() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = SqliteSyncMetadataRepository::new(db.pool().clone());

        assert_eq!(repo.get(KEY_REFERENCE_SECTION).await.unwrap(), None);

        repo.set(KEY_REFERENCE_SECTION, "S1").await.unwrap();
        assert_eq!(
            repo.get(KEY_REFERENCE_SECTION).await.unwrap(),
            Some("S1".to_string())
        );

        repo.set(KEY_REFERENCE_SECTION, "S2").await.unwrap();
        assert_eq!(
            repo.get(KEY_REFERENCE_SECTION).await.unwrap(),
            Some("S2".to_string())
        );

        repo.delete(KEY_REFERENCE_SECTION).await.unwrap();
        assert_eq!(repo.get(KEY_REFERENCE_SECTION).await.unwrap(), None);
    }
}
