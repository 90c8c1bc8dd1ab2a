use sqlx::SqlitePool;

use crate::errors::{DbError, DbResult};

// Embed all migration SQL files at compile time
const MIGRATION_INITIAL_SCHEMA: &str =
    include_str!("../../migrations/20250610000000_initial_schema.sql");

// List of migrations with their names and SQL content, in apply order
const MIGRATIONS: &[(&str, &str)] = &[(
    "20250610000000_initial_schema.sql",
    MIGRATION_INITIAL_SCHEMA,
)];

/// Apply any pending migrations, recording each in the `migrations` ledger.
pub async fn run(pool: &SqlitePool) -> DbResult<()> {
    create_migrations_table(pool).await?;

    let last_migration = get_last_migration(pool).await?;
    let pending = pending_migrations(last_migration.as_deref());

    if pending.is_empty() {
        log::debug!("Database schema up to date");
        return Ok(());
    }

    log::info!("Applying {} pending migration(s)", pending.len());

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DbError::Transaction(e.to_string()))?;

    for (name, sql) in pending {
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("Failed to apply {}: {}", name, e)))?;

        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO migrations (name, applied_at) VALUES (?, ?)")
            .bind(name)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("Failed to record {}: {}", name, e)))?;

        log::info!("Applied migration {}", name);
    }

    tx.commit()
        .await
        .map_err(|e| DbError::Transaction(e.to_string()))?;

    Ok(())
}

async fn create_migrations_table(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| DbError::Migration(format!("Failed to create migrations table: {}", e)))?;

    Ok(())
}

async fn get_last_migration(pool: &SqlitePool) -> DbResult<Option<String>> {
    let result =
        sqlx::query_scalar::<_, String>("SELECT name FROM migrations ORDER BY id DESC LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(DbError::Sqlx)?;

    Ok(result)
}

/// Determine which migrations still need to be applied
fn pending_migrations(last_migration: Option<&str>) -> Vec<(&'static str, &'static str)> {
    let mut pending = Vec::new();
    let mut should_include = last_migration.is_none();

    for &(name, sql) in MIGRATIONS {
        if should_include {
            pending.push((name, sql));
        } else if Some(name) == last_migration {
            // Found the last applied migration; include all subsequent ones
            should_include = true;
        }
    }

    pending
}
