//! In-memory reconciliation store.
//!
//! Same semantics as the SQLite store, without durability. Used by tests and
//! by embedders that persist elsewhere.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::ReconciliationConfig;
use crate::domain::entities::{ReconciliationJob, ReconciliationTimeline};
use crate::domain::repositories::{ReconciliationStore, StoreResult};

/// Lock order: jobs, then timelines.
#[derive(Default)]
pub struct InMemoryReconciliationStore {
    jobs: RwLock<HashMap<String, ReconciliationJob>>,
    timelines: RwLock<HashMap<String, ReconciliationTimeline>>,
    config: RwLock<Option<ReconciliationConfig>>,
}

impl InMemoryReconciliationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

fn sorted_by_creation(mut jobs: Vec<ReconciliationJob>) -> Vec<ReconciliationJob> {
    jobs.sort_by(|a, b| {
        a.metadata
            .created_at
            .cmp(&b.metadata.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    jobs
}

#[async_trait]
impl ReconciliationStore for InMemoryReconciliationStore {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<ReconciliationJob>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn save_job(&self, job: &ReconciliationJob) -> StoreResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn save_job_with_timeline(
        &self,
        job: &ReconciliationJob,
        timeline: &ReconciliationTimeline,
    ) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let mut timelines = self.timelines.write().await;
        jobs.insert(job.id.clone(), job.clone());
        timelines.insert(timeline.job_id.clone(), timeline.clone());
        Ok(())
    }

    async fn delete_job(&self, job_id: &str) -> StoreResult<bool> {
        let mut jobs = self.jobs.write().await;
        let mut timelines = self.timelines.write().await;
        let existed = jobs.remove(job_id).is_some();
        timelines.remove(job_id);
        Ok(existed)
    }

    async fn get_all_jobs(&self) -> StoreResult<Vec<ReconciliationJob>> {
        let jobs = self.jobs.read().await.values().cloned().collect();
        Ok(sorted_by_creation(jobs))
    }

    async fn get_jobs_by_district(&self, district_id: &str) -> StoreResult<Vec<ReconciliationJob>> {
        let jobs = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.district_id == district_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(jobs))
    }

    async fn cleanup_old_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let mut jobs = self.jobs.write().await;
        let mut timelines = self.timelines.write().await;

        let expired: Vec<String> = jobs
            .values()
            .filter(|j| j.status.is_terminal() && j.metadata.created_at < cutoff)
            .map(|j| j.id.clone())
            .collect();

        for id in &expired {
            jobs.remove(id);
            timelines.remove(id);
        }

        debug!(removed = expired.len(), cutoff = %cutoff, "Cleaned up old reconciliation jobs");
        Ok(expired)
    }

    async fn save_timeline(&self, timeline: &ReconciliationTimeline) -> StoreResult<()> {
        self.timelines
            .write()
            .await
            .insert(timeline.job_id.clone(), timeline.clone());
        Ok(())
    }

    async fn get_timeline(&self, job_id: &str) -> StoreResult<Option<ReconciliationTimeline>> {
        Ok(self.timelines.read().await.get(job_id).cloned())
    }

    async fn get_config(&self) -> StoreResult<Option<ReconciliationConfig>> {
        Ok(self.config.read().await.clone())
    }

    async fn save_config(&self, config: &ReconciliationConfig) -> StoreResult<()> {
        *self.config.write().await = Some(config.clone());
        Ok(())
    }
}
