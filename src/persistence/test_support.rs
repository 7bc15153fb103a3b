//! Store wrapper with injectable latency and write failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::memory::InMemoryReconciliationStore;
use crate::config::ReconciliationConfig;
use crate::domain::entities::{ReconciliationJob, ReconciliationTimeline};
use crate::domain::errors::StoreError;
use crate::domain::repositories::{ReconciliationStore, StoreResult};

#[derive(Default)]
pub(crate) struct FlakyStore {
    pub inner: Arc<InMemoryReconciliationStore>,
    /// Applied once to the next `get_job`, then reset.
    next_get_job_delay_ms: AtomicU64,
    /// Applied to every `get_jobs_by_district`.
    district_read_delay_ms: AtomicU64,
    fail_timeline_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay_next_get_job(&self, delay: Duration) {
        self.next_get_job_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn delay_district_reads(&self, delay: Duration) {
        self.district_read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_timeline_writes(&self, fail: bool) {
        self.fail_timeline_writes.store(fail, Ordering::SeqCst);
    }

    fn timeline_write_error(&self, job_id: &str) -> StoreResult<()> {
        if self.fail_timeline_writes.load(Ordering::SeqCst) {
            return Err(StoreError::CorruptRecord {
                id: job_id.to_string(),
                reason: "timeline write rejected".to_string(),
            });
        }
        Ok(())
    }
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl ReconciliationStore for FlakyStore {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<ReconciliationJob>> {
        let job = self.inner.get_job(job_id).await?;
        pause(self.next_get_job_delay_ms.swap(0, Ordering::SeqCst)).await;
        Ok(job)
    }

    async fn save_job(&self, job: &ReconciliationJob) -> StoreResult<()> {
        self.inner.save_job(job).await
    }

    async fn save_job_with_timeline(
        &self,
        job: &ReconciliationJob,
        timeline: &ReconciliationTimeline,
    ) -> StoreResult<()> {
        self.timeline_write_error(&job.id)?;
        self.inner.save_job_with_timeline(job, timeline).await
    }

    async fn delete_job(&self, job_id: &str) -> StoreResult<bool> {
        self.inner.delete_job(job_id).await
    }

    async fn get_all_jobs(&self) -> StoreResult<Vec<ReconciliationJob>> {
        self.inner.get_all_jobs().await
    }

    async fn get_jobs_by_district(&self, district_id: &str) -> StoreResult<Vec<ReconciliationJob>> {
        let jobs = self.inner.get_jobs_by_district(district_id).await?;
        pause(self.district_read_delay_ms.load(Ordering::SeqCst)).await;
        Ok(jobs)
    }

    async fn cleanup_old_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        self.inner.cleanup_old_jobs(cutoff).await
    }

    async fn save_timeline(&self, timeline: &ReconciliationTimeline) -> StoreResult<()> {
        self.timeline_write_error(&timeline.job_id)?;
        self.inner.save_timeline(timeline).await
    }

    async fn get_timeline(&self, job_id: &str) -> StoreResult<Option<ReconciliationTimeline>> {
        self.inner.get_timeline(job_id).await
    }

    async fn get_config(&self) -> StoreResult<Option<ReconciliationConfig>> {
        self.inner.get_config().await
    }

    async fn save_config(&self, config: &ReconciliationConfig) -> StoreResult<()> {
        self.inner.save_config(config).await
    }
}
