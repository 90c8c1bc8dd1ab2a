use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{query, query_as, query_scalar, Row, SqlitePool};

use crate::domains::meter::types::{
    NewMeterInput, NewMeterRecord, OldMeterInput, OldMeterRecord, PendingUnit,
};
use crate::errors::{DbError, DomainError, DomainResult};
use crate::validation::Validate;

/// Trait defining upload-queue store operations for meter records
#[async_trait]
pub trait MeterRepository: Send + Sync {
    /// Append an old-meter observation; returns the new row id.
    async fn insert_old(&self, input: &OldMeterInput) -> DomainResult<i64>;

    /// Append a new-meter observation, optionally linked to an old row.
    async fn insert_new(&self, input: &NewMeterInput, old_id: Option<i64>) -> DomainResult<i64>;

    /// All units whose old-meter side is still pending upload, oldest first.
    async fn list_pending_units(&self) -> DomainResult<Vec<PendingUnit>>;

    /// Units where either side carries a recorded upload error.
    async fn list_failed_units(&self) -> DomainResult<Vec<PendingUnit>>;

    /// Mark both members of a unit uploaded in one transaction.
    ///
    /// Aborts without touching the old row if the new row id does not
    /// match an existing record, so the two sides never diverge.
    async fn mark_uploaded(&self, old_id: i64, new_id: Option<i64>) -> DomainResult<()>;

    /// Record a rejection message against both members of a unit.
    async fn mark_failed(&self, old_id: i64, new_id: Option<i64>, error: &str)
        -> DomainResult<()>;

    async fn find_old_by_id(&self, id: i64) -> DomainResult<OldMeterRecord>;

    /// Delete an old-meter row; succeeds even if already gone.
    async fn delete_old(&self, id: i64) -> DomainResult<()>;

    /// Delete a new-meter row; succeeds even if already gone.
    async fn delete_new(&self, id: i64) -> DomainResult<()>;

    async fn pending_count(&self) -> DomainResult<i64>;
}

/// SQLite implementation of the meter repository
pub struct SqliteMeterRepository {
    pool: SqlitePool,
}

impl SqliteMeterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_unit_row(row: &SqliteRow) -> Result<PendingUnit, sqlx::Error> {
        let old = OldMeterRecord {
            id: row.try_get("o_id")?,
            account_id: row.try_get("o_account_id")?,
            serial_no_old: row.try_get("serial_no_old")?,
            mfd_year_old: row.try_get("mfd_year_old")?,
            final_reading: row.try_get("final_reading")?,
            meter_make_old: row.try_get("meter_make_old")?,
            category: row.try_get("category")?,
            image_1_old: row.try_get("image_1_old")?,
            image_2_old: row.try_get("image_2_old")?,
            created_by: row.try_get("o_created_by")?,
            is_uploaded: row.try_get("o_is_uploaded")?,
            upload_error: row.try_get("o_upload_error")?,
            created_at: row.try_get("o_created_at")?,
            uploaded_at: row.try_get("o_uploaded_at")?,
        };

        let new_id: Option<i64> = row.try_get("n_id")?;
        let new = match new_id {
            Some(id) => Some(NewMeterRecord {
                id,
                account_id: row.try_get("n_account_id")?,
                old_meter_id: row.try_get("old_meter_id")?,
                image_1_new: row.try_get("image_1_new")?,
                image_2_new: row.try_get("image_2_new")?,
                meter_make_new: row.try_get("meter_make_new")?,
                serial_no_new: row.try_get("serial_no_new")?,
                mfd_year_new: row.try_get("mfd_year_new")?,
                initial_reading_kwh: row.try_get("initial_reading_kwh")?,
                initial_reading_kvah: row.try_get("initial_reading_kvah")?,
                lat: row.try_get("lat")?,
                lon: row.try_get("lon")?,
                created_by: row.try_get("n_created_by")?,
                is_uploaded: row.try_get("n_is_uploaded")?,
                upload_error: row.try_get("n_upload_error")?,
                created_at: row.try_get("n_created_at")?,
                uploaded_at: row.try_get("n_uploaded_at")?,
            }),
            None => None,
        };

        Ok(PendingUnit { old, new })
    }

    async fn fetch_units(&self, where_clause: &str) -> DomainResult<Vec<PendingUnit>> {
        let sql = format!(
            "SELECT
                o.id AS o_id, o.account_id AS o_account_id, o.serial_no_old,
                o.mfd_year_old, o.final_reading, o.meter_make_old, o.category,
                o.image_1_old, o.image_2_old, o.created_by AS o_created_by,
                o.is_uploaded AS o_is_uploaded, o.upload_error AS o_upload_error,
                o.created_at AS o_created_at, o.uploaded_at AS o_uploaded_at,
                n.id AS n_id, n.account_id AS n_account_id, n.old_meter_id,
                n.image_1_new, n.image_2_new, n.meter_make_new, n.serial_no_new,
                n.mfd_year_new, n.initial_reading_kwh, n.initial_reading_kvah,
                n.lat, n.lon, n.created_by AS n_created_by,
                n.is_uploaded AS n_is_uploaded, n.upload_error AS n_upload_error,
                n.created_at AS n_created_at, n.uploaded_at AS n_uploaded_at
             FROM old_meter_details o
             LEFT OUTER JOIN new_meter_details n ON n.old_meter_id = o.id
             WHERE {}
             ORDER BY o.id ASC",
            where_clause
        );

        let rows = query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?;

        rows.iter()
            .map(|row| {
                Self::map_unit_row(row)
                    .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))
            })
            .collect()
    }
}

#[async_trait]
impl MeterRepository for SqliteMeterRepository {
    async fn insert_old(&self, input: &OldMeterInput) -> DomainResult<i64> {
        input.validate()?;
        let now = Utc::now().timestamp_millis();

        let result = query(
            "INSERT INTO old_meter_details (
                account_id, serial_no_old, mfd_year_old, final_reading,
                meter_make_old, category, image_1_old, image_2_old,
                created_by, is_uploaded, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&input.account_id)
        .bind(input.serial_no_old.as_deref().unwrap_or(""))
        .bind(input.mfd_year_old.as_deref().unwrap_or(""))
        .bind(input.final_reading.as_deref().unwrap_or(""))
        .bind(input.meter_make_old.as_deref().unwrap_or(""))
        .bind(input.category.as_deref().unwrap_or(""))
        .bind(input.image_1_old.as_deref().unwrap_or(""))
        .bind(input.image_2_old.as_deref().unwrap_or(""))
        .bind(input.created_by.as_deref().unwrap_or(""))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_new(&self, input: &NewMeterInput, old_id: Option<i64>) -> DomainResult<i64> {
        let now = Utc::now().timestamp_millis();

        let result = query(
            "INSERT INTO new_meter_details (
                account_id, old_meter_id, image_1_new, image_2_new,
                meter_make_new, serial_no_new, mfd_year_new,
                initial_reading_kwh, initial_reading_kvah, lat, lon,
                created_by, is_uploaded, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&input.account_id)
        .bind(old_id)
        .bind(input.image_1_new.as_deref().unwrap_or(""))
        .bind(input.image_2_new.as_deref().unwrap_or(""))
        .bind(input.meter_make_new.as_deref().unwrap_or(""))
        .bind(input.serial_no_new.as_deref().unwrap_or(""))
        .bind(input.mfd_year_new.as_deref().unwrap_or(""))
        .bind(input.initial_reading_kwh.as_deref().unwrap_or(""))
        .bind(input.initial_reading_kvah.as_deref().unwrap_or(""))
        .bind(input.lat)
        .bind(input.lon)
        .bind(input.created_by.as_deref().unwrap_or(""))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

        Ok(result.last_insert_rowid())
    }

    async fn list_pending_units(&self) -> DomainResult<Vec<PendingUnit>> {
        self.fetch_units("o.is_uploaded = 0").await
    }

    async fn list_failed_units(&self) -> DomainResult<Vec<PendingUnit>> {
        self.fetch_units(
            "COALESCE(o.upload_error, '') <> '' OR COALESCE(n.upload_error, '') <> ''",
        )
        .await
    }

    async fn mark_uploaded(&self, old_id: i64, new_id: Option<i64>) -> DomainResult<()> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::Database(DbError::Transaction(e.to_string())))?;

        let result = query(
            "UPDATE old_meter_details
             SET is_uploaded = 1, upload_error = NULL, uploaded_at = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(old_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::EntityNotFound("OldMeterRecord".to_string(), old_id));
        }

        if let Some(new_id) = new_id {
            let result = query(
                "UPDATE new_meter_details
                 SET is_uploaded = 1, upload_error = NULL, uploaded_at = ?
                 WHERE id = ?",
            )
            .bind(now)
            .bind(new_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back the old-side update.
                return Err(DomainError::EntityNotFound(
                    "NewMeterRecord".to_string(),
                    new_id,
                ));
            }
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::Database(DbError::Transaction(e.to_string())))?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        old_id: i64,
        new_id: Option<i64>,
        error: &str,
    ) -> DomainResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::Database(DbError::Transaction(e.to_string())))?;

        let result = query(
            "UPDATE old_meter_details
             SET is_uploaded = 0, upload_error = ?
             WHERE id = ?",
        )
        .bind(error)
        .bind(old_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::EntityNotFound("OldMeterRecord".to_string(), old_id));
        }

        if let Some(new_id) = new_id {
            let result = query(
                "UPDATE new_meter_details
                 SET is_uploaded = 0, upload_error = ?
                 WHERE id = ?",
            )
            .bind(error)
            .bind(new_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;

            if result.rows_affected() == 0 {
                return Err(DomainError::EntityNotFound(
                    "NewMeterRecord".to_string(),
                    new_id,
                ));
            }
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::Database(DbError::Transaction(e.to_string())))?;
        Ok(())
    }

    async fn find_old_by_id(&self, id: i64) -> DomainResult<OldMeterRecord> {
        query_as::<_, OldMeterRecord>("SELECT * FROM old_meter_details WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?
            .ok_or_else(|| DomainError::EntityNotFound("OldMeterRecord".to_string(), id))
    }

    async fn delete_old(&self, id: i64) -> DomainResult<()> {
        query("DELETE FROM old_meter_details WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;
        Ok(())
    }

    async fn delete_new(&self, id: i64) -> DomainResult<()> {
        query("DELETE FROM new_meter_details WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(DbError::Execution(e.to_string())))?;
        Ok(())
    }

    async fn pending_count(&self) -> DomainResult<i64> {
        let count = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM old_meter_details WHERE is_uploaded = 0",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::Database(DbError::Query(e.to_string())))?;
        Ok(count)
    }
}
