//! Reconciliation Store Trait
//!
//! Durable keyed storage for reconciliation jobs, their timelines and the
//! active configuration. The store is the source of truth; caches sit in
//! front of it and never hold data it does not have.

use crate::config::ReconciliationConfig;
use crate::domain::entities::{ReconciliationJob, ReconciliationTimeline};
use crate::domain::errors::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<ReconciliationJob>>;

    /// Insert or replace a job keyed by its id.
    async fn save_job(&self, job: &ReconciliationJob) -> StoreResult<()>;

    /// Write a job and its timeline as one unit: either both land or neither does.
    async fn save_job_with_timeline(
        &self,
        job: &ReconciliationJob,
        timeline: &ReconciliationTimeline,
    ) -> StoreResult<()>;

    /// Remove a job and its timeline. Returns whether the job existed.
    async fn delete_job(&self, job_id: &str) -> StoreResult<bool>;

    async fn get_all_jobs(&self) -> StoreResult<Vec<ReconciliationJob>>;

    async fn get_jobs_by_district(&self, district_id: &str) -> StoreResult<Vec<ReconciliationJob>>;

    /// Remove terminal jobs created before `cutoff`, each together with its
    /// timeline. Active jobs are never removed. Returns the removed ids.
    async fn cleanup_old_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>>;

    async fn save_timeline(&self, timeline: &ReconciliationTimeline) -> StoreResult<()>;

    async fn get_timeline(&self, job_id: &str) -> StoreResult<Option<ReconciliationTimeline>>;

    async fn get_config(&self) -> StoreResult<Option<ReconciliationConfig>>;

    async fn save_config(&self, config: &ReconciliationConfig) -> StoreResult<()>;
}
