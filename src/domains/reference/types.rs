use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::errors::DomainResult;
use crate::validation::{Validate, ValidationBuilder};

/// How long an ingested reference row stays usable before it is purged.
pub const REFERENCE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Maximum number of rows returned by a reference query.
pub const QUERY_LIMIT: i64 = 50;

/// One customer row of the reference dataset for the selected section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReferenceRecord {
    pub id: String,
    pub account_id: String,
    pub rr_no: String,
    pub consumer_name: String,
    pub consumer_address: String,
    pub division: String,
    pub section: String,
    pub sub_division: String,
    pub phase_type: String,
    pub previous_final_reading: String,
    pub billed_date: String,
    /// Epoch milliseconds of the last upsert; drives TTL expiry.
    pub last_updated: i64,
}

/// Input for upserting a reference record.
///
/// Every field except the identity is optional; absent text fields normalize
/// to an empty string and the two reading/date fields to "0", so an upsert
/// never fails over a missing optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceRecordInput {
    pub id: String,
    pub account_id: Option<String>,
    pub rr_no: Option<String>,
    pub consumer_name: Option<String>,
    pub consumer_address: Option<String>,
    pub division: Option<String>,
    pub section: Option<String>,
    pub sub_division: Option<String>,
    pub phase_type: Option<String>,
    pub previous_final_reading: Option<String>,
    pub billed_date: Option<String>,
}

impl ReferenceRecordInput {
    /// Fill defaults and stamp `last_updated`.
    pub fn normalized(&self, now_ms: i64) -> ReferenceRecord {
        ReferenceRecord {
            id: self.id.clone(),
            account_id: self.account_id.clone().unwrap_or_default(),
            rr_no: self.rr_no.clone().unwrap_or_default(),
            consumer_name: self.consumer_name.clone().unwrap_or_default(),
            consumer_address: self.consumer_address.clone().unwrap_or_default(),
            division: self.division.clone().unwrap_or_default(),
            section: self.section.clone().unwrap_or_default(),
            sub_division: self.sub_division.clone().unwrap_or_default(),
            phase_type: self.phase_type.clone().unwrap_or_default(),
            previous_final_reading: self
                .previous_final_reading
                .clone()
                .unwrap_or_else(|| "0".to_string()),
            billed_date: self.billed_date.clone().unwrap_or_else(|| "0".to_string()),
            last_updated: now_ms,
        }
    }
}

impl Validate for ReferenceRecordInput {
    fn validate(&self) -> DomainResult<()> {
        ValidationBuilder::new("id", Some(self.id.clone()))
            .not_blank()
            .validate()
    }
}

/// Query filter for the reference store.
#[derive(Debug, Clone)]
pub enum ReferenceFilter {
    /// Exact match on the section code.
    Section(String),
    /// Case-insensitive substring match over account id, RR number and
    /// consumer name.
    Search(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_fills_defaults() {
        let input = ReferenceRecordInput {
            id: "C-1".to_string(),
            consumer_name: Some("Asha".to_string()),
            ..Default::default()
        };
        let record = input.normalized(1_000);
        assert_eq!(record.account_id, "");
        assert_eq!(record.previous_final_reading, "0");
        assert_eq!(record.billed_date, "0");
        assert_eq!(record.consumer_name, "Asha");
        assert_eq!(record.last_updated, 1_000);
    }

    #[test]
    fn test_validate_requires_identity() {
        let input = ReferenceRecordInput {
            id: "  ".to_string(),
            ..Default::default()
        };
        assert!(input.validate().is_err());

        let input = ReferenceRecordInput {
            id: "C-2".to_string(),
            ..Default::default()
        };
        assert!(input.validate().is_ok());
    }
}
