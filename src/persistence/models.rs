//! Database Models
//!
//! Row shapes for reconciliation jobs and timelines, and their conversion
//! into domain entities.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::entities::{
    JobMetadata, JobStatus, ReconciliationJob, ReconciliationTimeline, TimelineStatus, TriggeredBy,
};
use crate::domain::errors::StoreError;
use crate::domain::value_objects::YearMonth;

/// Reconciliation job row
#[derive(Debug, Clone, FromRow)]
pub struct JobRecord {
    pub id: String,
    pub district_id: String,
    pub target_month: String, // YYYY-MM
    pub status: String,       // "active", "completed", "failed", "cancelled"
    pub start_date: DateTime<Utc>,
    pub max_end_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub finalized_date: Option<DateTime<Utc>>,
    pub triggered_by: String, // "manual" or "automatic"
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reconciliation timeline row
#[derive(Debug, Clone, FromRow)]
pub struct TimelineRecord {
    pub job_id: String,
    pub district_id: String,
    pub target_month: String,
    pub entries_json: String,
    pub status_json: String,
    pub updated_at: DateTime<Utc>,
}

fn corrupt(id: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::CorruptRecord {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

impl TryFrom<JobRecord> for ReconciliationJob {
    type Error = StoreError;

    fn try_from(row: JobRecord) -> Result<Self, Self::Error> {
        let target_month = row
            .target_month
            .parse::<YearMonth>()
            .map_err(|e| corrupt(&row.id, e))?;
        let status = row.status.parse::<JobStatus>().map_err(|e| corrupt(&row.id, e))?;
        let triggered_by = row
            .triggered_by
            .parse::<TriggeredBy>()
            .map_err(|e| corrupt(&row.id, e))?;

        Ok(ReconciliationJob {
            id: row.id,
            district_id: row.district_id,
            target_month,
            status,
            start_date: row.start_date,
            max_end_date: row.max_end_date,
            end_date: row.end_date,
            finalized_date: row.finalized_date,
            triggered_by,
            failure_reason: row.failure_reason,
            metadata: JobMetadata {
                created_at: row.created_at,
                updated_at: row.updated_at,
                triggered_by,
            },
        })
    }
}

impl TryFrom<TimelineRecord> for ReconciliationTimeline {
    type Error = StoreError;

    fn try_from(row: TimelineRecord) -> Result<Self, Self::Error> {
        let target_month = row
            .target_month
            .parse::<YearMonth>()
            .map_err(|e| corrupt(&row.job_id, e))?;
        let entries = serde_json::from_str(&row.entries_json)?;
        let status: TimelineStatus = serde_json::from_str(&row.status_json)?;

        Ok(ReconciliationTimeline {
            job_id: row.job_id,
            district_id: row.district_id,
            target_month,
            entries,
            status,
        })
    }
}
