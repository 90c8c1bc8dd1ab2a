use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use tokio::sync::OnceCell;

use crate::errors::{DbError, DbResult};

use super::migrations;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Handle to the on-device database. Cheap to clone; owned by the application
/// shell and injected into repositories.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database file at the given path, creating it if missing.
    /// Applies pragmas and runs any pending migrations. Safe to call on every
    /// startup.
    pub async fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionPool(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// Restricted to a single connection so every caller observes the same
    /// memory database.
    pub async fn open_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);

        // Tests pause tokio's clock; the pre-acquire ping would await the
        // worker thread with the acquire-timeout timer pending, which
        // paused time auto-advances straight to. The pool's single
        // dedicated connection makes the ping redundant anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .test_before_acquire(false)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionPool(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> DbResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Lazily-opened database shared between concurrent initializers.
///
/// The first caller performs the open; callers arriving while the open is in
/// flight await the same open instead of racing a second one.
#[derive(Clone, Default)]
pub struct SharedDatabase {
    cell: Arc<OnceCell<Database>>,
}

impl SharedDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_open(&self, path: impl AsRef<Path>) -> DbResult<Database> {
        let db = self
            .cell
            .get_or_try_init(|| Database::open(path.as_ref()))
            .await?;
        Ok(db.clone())
    }

    /// The database, if some caller has already opened it.
    pub fn get(&self) -> Option<Database> {
        self.cell.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_in_memory_runs_migrations() {
        let db = Database::open_in_memory().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer_data")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("meters.db");

        let db = Database::open(&path).await.unwrap();
        drop(db);
        // Second open re-runs migration discovery without error.
        let db = Database::open(&path).await.unwrap();
        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM migrations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(applied >= 1);
    }

    #[tokio::test]
    async fn test_shared_database_single_open() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("shared.db");
        let shared = SharedDatabase::new();

        let (a, b) = tokio::join!(shared.get_or_open(&path), shared.get_or_open(&path));
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(shared.get().is_some());
    }
}
