use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::entities::data_changes::DataChanges;
use crate::domain::value_objects::year_month::YearMonth;

/// Result of one reconciliation cycle. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationEntry {
    pub date: DateTime<Utc>,
    pub source_data_date: NaiveDate,
    pub changes: DataChanges,
    pub is_significant: bool,
    pub cache_updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelinePhase {
    /// No quiet cycle recorded since the last significant change.
    Monitoring,
    /// Quiet run shorter than the stability period.
    Stabilizing,
    /// Stability period met; awaiting finalization.
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for TimelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimelinePhase::Monitoring => "monitoring",
            TimelinePhase::Stabilizing => "stabilizing",
            TimelinePhase::Finalizing => "finalizing",
            TimelinePhase::Completed => "completed",
            TimelinePhase::Failed => "failed",
            TimelinePhase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStatus {
    pub phase: TimelinePhase,
    pub days_active: u32,
    pub days_stable: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationTimeline {
    pub job_id: String,
    pub district_id: String,
    pub target_month: YearMonth,
    pub entries: Vec<ReconciliationEntry>,
    pub status: TimelineStatus,
}

impl ReconciliationTimeline {
    pub fn new(job_id: String, district_id: String, target_month: YearMonth) -> Self {
        Self {
            job_id,
            district_id,
            target_month,
            entries: Vec::new(),
            status: TimelineStatus {
                phase: TimelinePhase::Monitoring,
                days_active: 0,
                days_stable: 0,
                message: "Reconciliation started".to_string(),
            },
        }
    }

    pub(crate) fn push(&mut self, entry: ReconciliationEntry) {
        self.entries.push(entry);
    }

    /// Length of the trailing run of non-significant entries, newest first.
    pub fn days_stable(&self) -> u32 {
        self.entries
            .iter()
            .rev()
            .take_while(|e| !e.is_significant)
            .count() as u32
    }

    pub fn latest(&self) -> Option<&ReconciliationEntry> {
        self.entries.last()
    }

    pub fn significant_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_significant).count()
    }
}
