use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::ReconciliationConfig;
use crate::domain::entities::{
    DistrictStatistics, JobStatus, ReconciliationEntry, ReconciliationJob, ReconciliationTimeline,
    TimelinePhase, TimelineStatus, TriggeredBy,
};
use crate::domain::errors::{ReconciliationError, ValidationError};
use crate::domain::repositories::ReconciliationStore;
use crate::domain::services::change_detection::ChangeDetector;
use crate::domain::services::clock::Clock;
use crate::domain::services::config_provider::ConfigProvider;
use crate::domain::value_objects::YearMonth;
use crate::persistence::cache::{CacheStats, ReconciliationCache};

/// Significant changes closer than this to the deadline trigger auto-extension.
const AUTO_EXTENSION_WINDOW_DAYS: i64 = 2;

pub type ReconciliationResult<T> = Result<T, ReconciliationError>;

/// Drives reconciliation jobs through `active → completed | failed | cancelled`.
///
/// Mutating operations hold a per-job lock for their whole duration, so
/// concurrent calls against one job id are serialized while different jobs
/// proceed in parallel. Reads never take the per-job locks.
pub struct ReconciliationOrchestrator {
    store: Arc<dyn ReconciliationStore>,
    cache: Arc<ReconciliationCache>,
    config: Arc<dyn ConfigProvider>,
    detector: Arc<dyn ChangeDetector>,
    clock: Arc<dyn Clock>,
    job_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ReconciliationOrchestrator {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        cache: Arc<ReconciliationCache>,
        config: Arc<dyn ConfigProvider>,
        detector: Arc<dyn ChangeDetector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            detector,
            clock,
            job_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn ReconciliationStore> {
        self.store.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    async fn lock_job(&self, job_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.job_locks.lock().await;
            locks.entry(job_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Authoritative read used by mutating operations.
    async fn require_job(&self, job_id: &str) -> ReconciliationResult<ReconciliationJob> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| ReconciliationError::JobNotFound(job_id.to_string()))
    }

    async fn load_timeline(&self, job: &ReconciliationJob) -> ReconciliationResult<ReconciliationTimeline> {
        match self.store.get_timeline(&job.id).await? {
            Some(timeline) => Ok(timeline),
            None => {
                warn!(job_id = %job.id, "Timeline missing for reconciliation job, starting a new one");
                Ok(ReconciliationTimeline::new(
                    job.id.clone(),
                    job.district_id.clone(),
                    job.target_month,
                ))
            }
        }
    }

    async fn persist_job(&self, job: &ReconciliationJob) -> ReconciliationResult<()> {
        self.store.save_job(job).await?;
        self.cache.set_job(job).await;
        Ok(())
    }

    async fn persist_timeline(&self, timeline: &ReconciliationTimeline) -> ReconciliationResult<()> {
        self.store.save_timeline(timeline).await?;
        self.cache.set_timeline(timeline).await;
        Ok(())
    }

    /// One store write for both, then the cache.
    async fn persist_job_and_timeline(
        &self,
        job: &ReconciliationJob,
        timeline: &ReconciliationTimeline,
    ) -> ReconciliationResult<()> {
        self.store.save_job_with_timeline(job, timeline).await?;
        self.cache.set_job(job).await;
        self.cache.set_timeline(timeline).await;
        Ok(())
    }

    /// Open a monitoring window for `(district_id, target_month)`.
    ///
    /// `config_override` only shapes the new job's deadline; cycles always
    /// read the live configuration.
    pub async fn start_reconciliation(
        &self,
        district_id: &str,
        target_month: YearMonth,
        config_override: Option<ReconciliationConfig>,
        triggered_by: TriggeredBy,
    ) -> ReconciliationResult<ReconciliationJob> {
        let district_id = district_id.trim();
        if district_id.is_empty() {
            return Err(ValidationError::EmptyDistrictId.into());
        }

        let config = match config_override {
            Some(config) => {
                config.validate()?;
                config
            }
            None => self.config.get_config().await,
        };

        let now = self.clock.now();
        let job = ReconciliationJob::new(
            district_id.to_string(),
            target_month,
            config.max_reconciliation_days,
            triggered_by,
            now,
        )?;
        let timeline =
            ReconciliationTimeline::new(job.id.clone(), job.district_id.clone(), job.target_month);

        let _guard = self.lock_job(&job.id).await;
        self.persist_job_and_timeline(&job, &timeline).await?;

        info!(
            job_id = %job.id,
            district_id = %job.district_id,
            target_month = %job.target_month,
            triggered_by = %triggered_by,
            max_end_date = %job.max_end_date,
            "Reconciliation started"
        );

        Ok(job)
    }

    /// Record one comparison of fresh statistics against the cached snapshot.
    ///
    /// Terminal jobs are left untouched and their last status is returned.
    pub async fn process_reconciliation_cycle(
        &self,
        job_id: &str,
        current: &DistrictStatistics,
        cached: &DistrictStatistics,
    ) -> ReconciliationResult<TimelineStatus> {
        let _guard = self.lock_job(job_id).await;
        let mut job = self.require_job(job_id).await?;
        let mut timeline = self.load_timeline(&job).await?;

        if job.status.is_terminal() {
            debug!(job_id = %job_id, status = %job.status, "Skipping cycle for finished reconciliation");
            return Ok(timeline.status);
        }

        let config = self.config.get_config().await;
        let now = self.clock.now();

        let changes = self.detector.detect_changes(current, cached)?;
        let is_significant = self
            .detector
            .is_significant_change(&changes, &config.significant_change_thresholds);

        let near_deadline = job.time_until_deadline(now) <= Duration::days(AUTO_EXTENSION_WINDOW_DAYS);
        let extended_by = if is_significant && near_deadline && config.auto_extension_enabled {
            let days = config.auto_extension_days();
            match job.extend(days, now) {
                Ok(()) => Some(days),
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Auto-extension skipped");
                    None
                }
            }
        } else {
            None
        };

        let notes = extended_by.map(|days| format!("Auto-extended by {} days", days));
        timeline.push(ReconciliationEntry {
            date: now,
            source_data_date: changes.source_data_date,
            cache_updated: changes.has_changes,
            is_significant,
            notes,
            changes,
        });
        timeline.status = active_status(&job, &timeline, &config, now, extended_by);

        if extended_by.is_some() {
            self.persist_job_and_timeline(&job, &timeline).await?;
        } else {
            self.persist_timeline(&timeline).await?;
        }

        info!(
            job_id = %job.id,
            district_id = %job.district_id,
            target_month = %job.target_month,
            significant = is_significant,
            days_stable = timeline.status.days_stable,
            phase = %timeline.status.phase,
            "Reconciliation cycle recorded"
        );
        if let Some(days) = extended_by {
            info!(
                job_id = %job.id,
                extension_days = days,
                max_end_date = %job.max_end_date,
                "Reconciliation auto-extended"
            );
        }

        Ok(timeline.status)
    }

    /// Push the deadline out by `days`.
    ///
    /// Terminal jobs and non-positive `days` are no-ops; requests above
    /// `max_extension_days` are rejected.
    pub async fn extend_reconciliation(
        &self,
        job_id: &str,
        days: i64,
    ) -> ReconciliationResult<ReconciliationJob> {
        let _guard = self.lock_job(job_id).await;
        let mut job = self.require_job(job_id).await?;

        if job.status.is_terminal() || days <= 0 {
            debug!(job_id = %job_id, status = %job.status, days, "Ignoring extension request");
            return Ok(job);
        }

        let max = self.config.get_config().await.max_extension_days;
        let days = u32::try_from(days)
            .ok()
            .filter(|d| *d <= max)
            .ok_or(ValidationError::ExtensionTooLarge { requested: days, max })?;

        job.extend(days, self.clock.now())?;
        self.persist_job(&job).await?;

        info!(
            job_id = %job.id,
            extension_days = days,
            max_end_date = %job.max_end_date,
            "Reconciliation extended"
        );

        Ok(job)
    }

    /// Complete the job once the data is stable or the deadline has passed.
    ///
    /// Already finished jobs are returned unchanged.
    pub async fn finalize_reconciliation(&self, job_id: &str) -> ReconciliationResult<ReconciliationJob> {
        let _guard = self.lock_job(job_id).await;
        let mut job = self.require_job(job_id).await?;

        if job.status.is_terminal() {
            debug!(job_id = %job_id, status = %job.status, "Reconciliation already finalized");
            return Ok(job);
        }

        let mut timeline = self.load_timeline(&job).await?;
        let required = self.config.get_config().await.stability_period_days;
        let now = self.clock.now();
        let days_stable = timeline.days_stable();
        let deadline_passed = job.is_past_deadline(now);

        if days_stable < required && !deadline_passed {
            return Err(ReconciliationError::StabilityPeriodNotMet {
                days_stable,
                required,
            });
        }

        job.close(JobStatus::Completed, now);
        let message = if days_stable >= required {
            format!("Finalized after {} stable days", days_stable)
        } else {
            format!(
                "Finalized at maximum reconciliation period with {} of {} stable days",
                days_stable, required
            )
        };
        timeline.status = TimelineStatus {
            phase: TimelinePhase::Completed,
            days_active: job.days_active(now),
            days_stable,
            message,
        };

        self.persist_job_and_timeline(&job, &timeline).await?;

        info!(
            job_id = %job.id,
            district_id = %job.district_id,
            target_month = %job.target_month,
            days_stable,
            deadline_passed,
            "Reconciliation finalized"
        );

        Ok(job)
    }

    pub async fn cancel_reconciliation(&self, job_id: &str) -> ReconciliationResult<ReconciliationJob> {
        self.close_job(job_id, JobStatus::Cancelled, None).await
    }

    pub async fn fail_reconciliation(
        &self,
        job_id: &str,
        reason: &str,
    ) -> ReconciliationResult<ReconciliationJob> {
        self.close_job(job_id, JobStatus::Failed, Some(reason.to_string())).await
    }

    async fn close_job(
        &self,
        job_id: &str,
        status: JobStatus,
        reason: Option<String>,
    ) -> ReconciliationResult<ReconciliationJob> {
        let _guard = self.lock_job(job_id).await;
        let mut job = self.require_job(job_id).await?;

        if job.status.is_terminal() {
            debug!(job_id = %job_id, status = %job.status, "Reconciliation already finished");
            return Ok(job);
        }

        let mut timeline = self.load_timeline(&job).await?;
        let now = self.clock.now();

        job.close(status, now);
        job.failure_reason = reason.clone();

        let (phase, message) = match status {
            JobStatus::Failed => (
                TimelinePhase::Failed,
                format!("Reconciliation failed: {}", reason.as_deref().unwrap_or("unknown")),
            ),
            _ => (TimelinePhase::Cancelled, "Reconciliation cancelled".to_string()),
        };
        timeline.status = TimelineStatus {
            phase,
            days_active: job.days_active(now),
            days_stable: timeline.days_stable(),
            message,
        };

        self.persist_job_and_timeline(&job, &timeline).await?;

        info!(
            job_id = %job.id,
            district_id = %job.district_id,
            status = %job.status,
            reason = reason.as_deref().unwrap_or(""),
            "Reconciliation closed"
        );

        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> ReconciliationResult<Option<ReconciliationJob>> {
        if let Some(job) = self.cache.get_job(job_id).await {
            return Ok(Some(job));
        }
        let ticket = self.cache.fill_ticket().await;
        let job = self.store.get_job(job_id).await?;
        if let Some(job) = &job {
            self.cache.fill_job(job, ticket).await;
        }
        Ok(job)
    }

    pub async fn get_timeline(&self, job_id: &str) -> ReconciliationResult<Option<ReconciliationTimeline>> {
        if let Some(timeline) = self.cache.get_timeline(job_id).await {
            return Ok(Some(timeline));
        }
        let ticket = self.cache.fill_ticket().await;
        let timeline = self.store.get_timeline(job_id).await?;
        if let Some(timeline) = &timeline {
            self.cache.fill_timeline(timeline, ticket).await;
        }
        Ok(timeline)
    }

    /// Active jobs, oldest first, optionally restricted to one district.
    pub async fn get_scheduled_reconciliations(
        &self,
        district_id: Option<&str>,
    ) -> ReconciliationResult<Vec<ReconciliationJob>> {
        let jobs = match district_id {
            Some(district_id) => self.store.get_jobs_by_district(district_id).await?,
            None => self.store.get_all_jobs().await?,
        };
        Ok(jobs.into_iter().filter(|j| j.is_active()).collect())
    }

    pub async fn get_reconciliation_status(&self, job_id: &str) -> ReconciliationResult<TimelineStatus> {
        self.get_timeline(job_id)
            .await?
            .map(|timeline| timeline.status)
            .ok_or_else(|| ReconciliationError::JobNotFound(job_id.to_string()))
    }

    /// Remove finished jobs created more than `max_age_days` ago.
    pub async fn cleanup_old_jobs(&self, max_age_days: u32) -> ReconciliationResult<Vec<String>> {
        let now = self.clock.now();
        let cutoff = now
            .checked_sub_signed(Duration::days(max_age_days as i64))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.store.cleanup_old_jobs(cutoff).await?;

        let mut locks = self.job_locks.lock().await;
        for job_id in &removed {
            self.cache.invalidate_job(job_id).await;
            locks.remove(job_id);
        }
        drop(locks);

        info!(removed = removed.len(), cutoff = %cutoff, "Old reconciliation jobs cleaned up");
        Ok(removed)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}

fn active_status(
    job: &ReconciliationJob,
    timeline: &ReconciliationTimeline,
    config: &ReconciliationConfig,
    now: DateTime<Utc>,
    extended_by: Option<u32>,
) -> TimelineStatus {
    let required = config.stability_period_days;
    let days_stable = timeline.days_stable();

    let phase = if days_stable == 0 {
        TimelinePhase::Monitoring
    } else if days_stable < required {
        TimelinePhase::Stabilizing
    } else {
        TimelinePhase::Finalizing
    };

    let message = match (extended_by, phase) {
        (Some(days), _) => format!(
            "Significant change near deadline, extended by {} days to {}",
            days,
            job.max_end_date.format("%Y-%m-%d")
        ),
        (None, TimelinePhase::Monitoring) => "Significant change detected, stability counter reset".to_string(),
        (None, TimelinePhase::Finalizing) => {
            format!("Stable for {} of {} days, ready to finalize", days_stable, required)
        }
        (None, _) => format!("Stable for {} of {} days", days_stable, required),
    };

    TimelineStatus {
        phase,
        days_active: job.days_active(now),
        days_stable,
        message,
    }
}
