use chrono::Datelike;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::entities::{JobStatus, ReconciliationJob, TriggeredBy};
use crate::domain::repositories::ReconciliationStore;
use crate::domain::services::clock::Clock;
use crate::domain::services::orchestrator::{ReconciliationOrchestrator, ReconciliationResult};
use crate::domain::value_objects::YearMonth;

pub const DEFAULT_CUTOFF_DAY: u32 = 5;

/// Starts month-end reconciliations during the first days of each month.
///
/// Duplicate detection reads the store before starting a job, under a lock
/// per (district, month) pair, so overlapping ticks in one process cannot both
/// start a job. Two scheduler instances sharing a store can still both pass
/// that check; there is no cross-process locking.
pub struct ReconciliationScheduler {
    orchestrator: Arc<ReconciliationOrchestrator>,
    store: Arc<dyn ReconciliationStore>,
    clock: Arc<dyn Clock>,
    cutoff_day: u32,
    pair_locks: Mutex<HashMap<(String, YearMonth), Arc<Mutex<()>>>>,
}

impl ReconciliationScheduler {
    pub fn new(orchestrator: Arc<ReconciliationOrchestrator>) -> Self {
        Self {
            store: orchestrator.store(),
            clock: orchestrator.clock(),
            orchestrator,
            cutoff_day: DEFAULT_CUTOFF_DAY,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_cutoff_day(mut self, cutoff_day: u32) -> Self {
        self.cutoff_day = cutoff_day;
        self
    }

    pub fn cutoff_day(&self) -> u32 {
        self.cutoff_day
    }

    /// Month the next transition run would target.
    pub fn target_month(&self) -> YearMonth {
        YearMonth::from_date(self.clock.today()).previous()
    }

    pub fn is_transition_window(&self) -> bool {
        self.clock.today().day() <= self.cutoff_day
    }

    /// Schedule the previous month for each district.
    ///
    /// Returns the number of jobs actually started; zero outside the
    /// transition window.
    pub async fn auto_schedule_for_month_transition(
        &self,
        district_ids: &[String],
    ) -> ReconciliationResult<usize> {
        let today = self.clock.today();
        if !self.is_transition_window() {
            debug!(
                day = today.day(),
                cutoff_day = self.cutoff_day,
                "Outside month transition window, nothing to schedule"
            );
            return Ok(0);
        }

        let target_month = self.target_month();
        let mut seen = HashSet::new();
        let mut started = 0;

        for district_id in district_ids.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
            if !seen.insert(district_id) {
                continue;
            }
            let (_, created) = self
                .schedule_reconciliation(district_id, target_month, TriggeredBy::Automatic)
                .await?;
            if created {
                started += 1;
            }
        }

        info!(
            target_month = %target_month,
            districts = seen.len(),
            started,
            "Month transition scheduling completed"
        );

        Ok(started)
    }

    /// Start a job for the pair unless an active or completed one exists.
    ///
    /// Returns the covering job and whether it was created by this call.
    pub async fn schedule_reconciliation(
        &self,
        district_id: &str,
        target_month: YearMonth,
        triggered_by: TriggeredBy,
    ) -> ReconciliationResult<(ReconciliationJob, bool)> {
        let key = (district_id.to_string(), target_month);
        let lock = {
            let mut locks = self.pair_locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().await;
            self.schedule_locked(district_id, target_month, triggered_by).await
        };

        // Drop the pair's lock once no other caller is waiting on it
        let mut locks = self.pair_locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
        drop(locks);

        result
    }

    async fn schedule_locked(
        &self,
        district_id: &str,
        target_month: YearMonth,
        triggered_by: TriggeredBy,
    ) -> ReconciliationResult<(ReconciliationJob, bool)> {
        let existing = self
            .store
            .get_jobs_by_district(district_id)
            .await?
            .into_iter()
            .find(|job| {
                job.target_month == target_month
                    && matches!(job.status, JobStatus::Active | JobStatus::Completed)
            });

        if let Some(job) = existing {
            debug!(
                job_id = %job.id,
                district_id = %district_id,
                target_month = %target_month,
                status = %job.status,
                "Reconciliation already scheduled"
            );
            return Ok((job, false));
        }

        let job = self
            .orchestrator
            .start_reconciliation(district_id, target_month, None, triggered_by)
            .await?;
        Ok((job, true))
    }

    pub async fn get_scheduled_reconciliations(
        &self,
        district_id: Option<&str>,
    ) -> ReconciliationResult<Vec<ReconciliationJob>> {
        self.orchestrator.get_scheduled_reconciliations(district_id).await
    }
}
