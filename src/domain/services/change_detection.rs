use std::sync::Arc;
use tracing::debug;

use crate::config::SignificantChangeThresholds;
use crate::domain::entities::data_changes::*;
use crate::domain::entities::DistrictStatistics;
use crate::domain::errors::ValidationError;
use crate::domain::services::clock::{Clock, SystemClock};

/// Compares statistics snapshots and judges whether differences matter.
pub trait ChangeDetector: Send + Sync {
    fn detect_changes(
        &self,
        current: &DistrictStatistics,
        cached: &DistrictStatistics,
    ) -> Result<DataChanges, ValidationError>;

    fn is_significant_change(
        &self,
        changes: &DataChanges,
        thresholds: &SignificantChangeThresholds,
    ) -> bool;
}

/// Percent change from `previous` to `current`, rounded to two decimals.
/// Growth from zero counts as 100%.
pub fn percent_change(previous: u32, current: u32) -> f64 {
    if previous == 0 {
        return if current == 0 { 0.0 } else { 100.0 };
    }
    let pct = (current as f64 - previous as f64) / previous as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

pub struct ChangeDetectionEngine {
    clock: Arc<dyn Clock>,
}

impl Default for ChangeDetectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeDetectionEngine {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl ChangeDetector for ChangeDetectionEngine {
    fn detect_changes(
        &self,
        current: &DistrictStatistics,
        cached: &DistrictStatistics,
    ) -> Result<DataChanges, ValidationError> {
        if current.district_id != cached.district_id {
            return Err(ValidationError::DistrictMismatch {
                current: current.district_id.clone(),
                cached: cached.district_id.clone(),
            });
        }

        let mut changes = DataChanges::unchanged(self.clock.now(), current.as_of_date);

        if current.membership.total != cached.membership.total {
            changes.changed_fields.push(FIELD_MEMBERSHIP.to_string());
            changes.membership_change = Some(MembershipChange {
                previous: cached.membership.total,
                current: current.membership.total,
                percent_change: percent_change(cached.membership.total, current.membership.total),
            });
        }

        if current.membership.change != cached.membership.change
            || current.membership.change_percent != cached.membership.change_percent
        {
            changes.changed_fields.push(FIELD_MEMBERSHIP_CHANGE.to_string());
        }

        if current.clubs.total != cached.clubs.total {
            changes.changed_fields.push(FIELD_CLUB_COUNT.to_string());
            changes.club_count_change = Some(ClubCountChange {
                previous: cached.clubs.total,
                current: current.clubs.total,
                absolute_change: current.clubs.total as i64 - cached.clubs.total as i64,
            });
        }

        let (c, p) = (&current.clubs, &cached.clubs);
        if c.active != p.active || c.suspended != p.suspended || c.ineligible != p.ineligible || c.low != p.low {
            changes.changed_fields.push(FIELD_CLUB_STATUS.to_string());
        }

        if c.distinguished != p.distinguished {
            changes.changed_fields.push(FIELD_DISTINGUISHED.to_string());
            changes.distinguished_change = Some(DistinguishedChange {
                previous: p.distinguished,
                current: c.distinguished,
                percent_change: percent_change(p.distinguished, c.distinguished),
            });
        }

        if current.education != cached.education {
            changes.changed_fields.push(FIELD_EDUCATION.to_string());
        }

        changes.has_changes = !changes.changed_fields.is_empty();

        debug!(
            district_id = %current.district_id,
            source_data_date = %current.as_of_date,
            changed_fields = ?changes.changed_fields,
            "Detected statistics changes"
        );

        Ok(changes)
    }

    fn is_significant_change(
        &self,
        changes: &DataChanges,
        thresholds: &SignificantChangeThresholds,
    ) -> bool {
        if !changes.has_changes {
            return false;
        }

        let membership = changes
            .membership_change
            .as_ref()
            .is_some_and(|m| m.percent_change.abs() >= thresholds.membership_percent);

        let club_count = changes
            .club_count_change
            .as_ref()
            .is_some_and(|c| c.absolute_change.unsigned_abs() >= thresholds.club_count_absolute as u64);

        let distinguished = changes
            .distinguished_change
            .as_ref()
            .is_some_and(|d| d.percent_change.abs() >= thresholds.distinguished_percent);

        membership || club_count || distinguished
    }
}
