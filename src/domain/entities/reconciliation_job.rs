use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::year_month::YearMonth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(JobStatus::Active),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(ValidationError::InvalidConfiguration(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Manual,
    Automatic,
}

impl TriggeredBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggeredBy::Manual => "manual",
            TriggeredBy::Automatic => "automatic",
        }
    }
}

impl fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggeredBy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TriggeredBy::Manual),
            "automatic" => Ok(TriggeredBy::Automatic),
            other => Err(ValidationError::InvalidConfiguration(format!(
                "unknown trigger '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub triggered_by: TriggeredBy,
}

/// Monitoring window for one (district, month) pair.
///
/// Invariants: `max_end_date > start_date`; `end_date` and `finalized_date`
/// are set exactly when `status` is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationJob {
    pub id: String,
    pub district_id: String,
    pub target_month: YearMonth,
    pub status: JobStatus,
    pub start_date: DateTime<Utc>,
    pub max_end_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub finalized_date: Option<DateTime<Utc>>,
    pub triggered_by: TriggeredBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub metadata: JobMetadata,
}

impl ReconciliationJob {
    pub fn new(
        district_id: String,
        target_month: YearMonth,
        max_reconciliation_days: u32,
        triggered_by: TriggeredBy,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let max_end_date = deadline_after(now, max_reconciliation_days.max(1))?;
        let id = format!(
            "recon_{}_{}_{}",
            district_id,
            target_month,
            uuid::Uuid::new_v4().simple()
        );
        Ok(Self {
            id,
            district_id,
            target_month,
            status: JobStatus::Active,
            start_date: now,
            max_end_date,
            end_date: None,
            finalized_date: None,
            triggered_by,
            failure_reason: None,
            metadata: JobMetadata {
                created_at: now,
                updated_at: now,
                triggered_by,
            },
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.max_end_date
    }

    pub fn time_until_deadline(&self, now: DateTime<Utc>) -> Duration {
        self.max_end_date - now
    }

    /// Whole days elapsed since the job started.
    pub fn days_active(&self, now: DateTime<Utc>) -> u32 {
        (now - self.start_date).num_days().max(0) as u32
    }

    /// Leaves the job untouched when the new deadline is not representable.
    pub(crate) fn extend(&mut self, days: u32, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.max_end_date = deadline_after(self.max_end_date, days)?;
        self.metadata.updated_at = now;
        Ok(())
    }

    pub(crate) fn close(&mut self, status: JobStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.end_date = Some(now);
        self.finalized_date = Some(now);
        self.metadata.updated_at = now;
    }
}

fn deadline_after(from: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, ValidationError> {
    from.checked_add_signed(Duration::days(days as i64))
        .ok_or(ValidationError::DeadlineOutOfRange { days })
}
