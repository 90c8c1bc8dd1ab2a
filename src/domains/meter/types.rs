use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::errors::DomainResult;
use crate::validation::{Validate, ValidationBuilder};

/// Observation of the meter being removed from an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OldMeterRecord {
    pub id: i64,
    pub account_id: String,
    pub serial_no_old: String,
    pub mfd_year_old: String,
    pub final_reading: String,
    pub meter_make_old: String,
    pub category: String,
    pub image_1_old: String,
    pub image_2_old: String,
    pub created_by: String,
    pub is_uploaded: bool,
    pub upload_error: Option<String>,
    pub created_at: i64,
    pub uploaded_at: Option<i64>,
}

/// Observation of the replacement meter, linked back to the removed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NewMeterRecord {
    pub id: i64,
    pub account_id: String,
    pub old_meter_id: Option<i64>,
    pub image_1_new: String,
    pub image_2_new: String,
    pub meter_make_new: String,
    pub serial_no_new: String,
    pub mfd_year_new: String,
    pub initial_reading_kwh: String,
    pub initial_reading_kvah: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub created_by: String,
    pub is_uploaded: bool,
    pub upload_error: Option<String>,
    pub created_at: i64,
    pub uploaded_at: Option<i64>,
}

/// Input for appending an old-meter observation.
///
/// The account identifier is required and checked before any database
/// interaction; everything else defaults to an empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OldMeterInput {
    pub account_id: String,
    pub serial_no_old: Option<String>,
    pub mfd_year_old: Option<String>,
    pub final_reading: Option<String>,
    pub meter_make_old: Option<String>,
    pub category: Option<String>,
    pub image_1_old: Option<String>,
    pub image_2_old: Option<String>,
    pub created_by: Option<String>,
}

impl Validate for OldMeterInput {
    fn validate(&self) -> DomainResult<()> {
        ValidationBuilder::new("account_id", Some(self.account_id.clone()))
            .not_blank()
            .validate()
    }
}

/// Input for appending a new-meter observation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMeterInput {
    pub account_id: String,
    pub image_1_new: Option<String>,
    pub image_2_new: Option<String>,
    pub meter_make_new: Option<String>,
    pub serial_no_new: Option<String>,
    pub mfd_year_new: Option<String>,
    pub initial_reading_kwh: Option<String>,
    pub initial_reading_kvah: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub created_by: Option<String>,
}

/// One meter-replacement event: the old-meter record plus the optional
/// new-meter record linked by `old_meter_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUnit {
    pub old: OldMeterRecord,
    pub new: Option<NewMeterRecord>,
}

impl PendingUnit {
    pub fn account_id(&self) -> &str {
        &self.old.account_id
    }

    /// A unit counts as synced only when every present member is uploaded.
    pub fn is_synced(&self) -> bool {
        self.old.is_uploaded && self.new.as_ref().map_or(true, |n| n.is_uploaded)
    }
}

/// Which side of a unit an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSide {
    Old,
    New,
}

/// Consolidated per-account view of failed uploads, for the review screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedUnitGroup {
    pub account_id: String,
    pub old: Option<OldMeterRecord>,
    pub new: Option<NewMeterRecord>,
    pub has_duplicate_error: bool,
    pub has_generic_error: bool,
}
