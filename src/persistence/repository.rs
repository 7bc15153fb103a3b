//! SQLite Reconciliation Store
//!
//! Data access layer for reconciliation jobs, timelines and configuration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, error};

use super::models::*;
use super::DbPool;
use crate::config::ReconciliationConfig;
use crate::domain::entities::{ReconciliationJob, ReconciliationTimeline};
use crate::domain::errors::StoreError;
use crate::domain::repositories::{ReconciliationStore, StoreResult};
use crate::domain::services::clock::{Clock, SystemClock};

const JOB_COLUMNS: &str = "id, district_id, target_month, status, start_date, max_end_date, \
     end_date, finalized_date, triggered_by, failure_reason, created_at, updated_at";

pub struct SqliteReconciliationStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqliteReconciliationStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// `clock` stamps the `updated_at` column of timeline and config rows.
    pub fn with_clock(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

async fn upsert_job(conn: &mut SqliteConnection, job: &ReconciliationJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO reconciliation_jobs (
            id, district_id, target_month, status, start_date, max_end_date,
            end_date, finalized_date, triggered_by, failure_reason, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            max_end_date = excluded.max_end_date,
            end_date = excluded.end_date,
            finalized_date = excluded.finalized_date,
            failure_reason = excluded.failure_reason,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&job.id)
    .bind(&job.district_id)
    .bind(job.target_month.to_string())
    .bind(job.status.as_str())
    .bind(job.start_date)
    .bind(job.max_end_date)
    .bind(job.end_date)
    .bind(job.finalized_date)
    .bind(job.triggered_by.as_str())
    .bind(&job.failure_reason)
    .bind(job.metadata.created_at)
    .bind(job.metadata.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_timeline(
    conn: &mut SqliteConnection,
    timeline: &ReconciliationTimeline,
    entries_json: &str,
    status_json: &str,
    updated_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO reconciliation_timelines (
            job_id, district_id, target_month, entries_json, status_json, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(job_id) DO UPDATE SET
            entries_json = excluded.entries_json,
            status_json = excluded.status_json,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&timeline.job_id)
    .bind(&timeline.district_id)
    .bind(timeline.target_month.to_string())
    .bind(entries_json)
    .bind(status_json)
    .bind(updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

fn timeline_json(timeline: &ReconciliationTimeline) -> StoreResult<(String, String)> {
    Ok((
        serde_json::to_string(&timeline.entries)?,
        serde_json::to_string(&timeline.status)?,
    ))
}

fn log_db_error<'a>(operation: &str, id: &'a str) -> impl FnOnce(sqlx::Error) -> StoreError + 'a {
    let operation = operation.to_string();
    move |e| {
        error!("Failed to {} {}: {}", operation, id, e);
        StoreError::Database(e)
    }
}

#[async_trait]
impl ReconciliationStore for SqliteReconciliationStore {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<ReconciliationJob>> {
        let record = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {} FROM reconciliation_jobs WHERE id = ?1",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(log_db_error("get job", job_id))?;

        record.map(ReconciliationJob::try_from).transpose()
    }

    async fn save_job(&self, job: &ReconciliationJob) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_job(&mut *conn, job)
            .await
            .map_err(log_db_error("save job", &job.id))?;

        debug!(job_id = %job.id, status = %job.status, "Saved reconciliation job");
        Ok(())
    }

    async fn save_job_with_timeline(
        &self,
        job: &ReconciliationJob,
        timeline: &ReconciliationTimeline,
    ) -> StoreResult<()> {
        let (entries_json, status_json) = timeline_json(timeline)?;
        let mut tx = self.pool.begin().await?;

        upsert_job(&mut *tx, job)
            .await
            .map_err(log_db_error("save job", &job.id))?;
        upsert_timeline(&mut *tx, timeline, &entries_json, &status_json, self.clock.now())
            .await
            .map_err(log_db_error("save timeline", &timeline.job_id))?;

        tx.commit().await?;
        debug!(job_id = %job.id, status = %job.status, phase = %timeline.status.phase, "Saved reconciliation job with timeline");
        Ok(())
    }

    async fn delete_job(&self, job_id: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM reconciliation_timelines WHERE job_id = ?1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        let rows_affected = sqlx::query("DELETE FROM reconciliation_jobs WHERE id = ?1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(rows_affected > 0)
    }

    async fn get_all_jobs(&self) -> StoreResult<Vec<ReconciliationJob>> {
        let records = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {} FROM reconciliation_jobs ORDER BY created_at ASC, id ASC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(log_db_error("list", "jobs"))?;

        records.into_iter().map(ReconciliationJob::try_from).collect()
    }

    async fn get_jobs_by_district(&self, district_id: &str) -> StoreResult<Vec<ReconciliationJob>> {
        let records = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {} FROM reconciliation_jobs WHERE district_id = ?1 ORDER BY created_at ASC, id ASC",
            JOB_COLUMNS
        ))
        .bind(district_id)
        .fetch_all(&self.pool)
        .await
        .map_err(log_db_error("list jobs for district", district_id))?;

        records.into_iter().map(ReconciliationJob::try_from).collect()
    }

    async fn cleanup_old_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let expired: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM reconciliation_jobs WHERE status != 'active' AND created_at < ?1",
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        for id in &expired {
            sqlx::query("DELETE FROM reconciliation_timelines WHERE job_id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM reconciliation_jobs WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(removed = expired.len(), cutoff = %cutoff, "Cleaned up old reconciliation jobs");
        Ok(expired)
    }

    async fn save_timeline(&self, timeline: &ReconciliationTimeline) -> StoreResult<()> {
        let (entries_json, status_json) = timeline_json(timeline)?;
        let mut conn = self.pool.acquire().await?;
        upsert_timeline(&mut *conn, timeline, &entries_json, &status_json, self.clock.now())
            .await
            .map_err(log_db_error("save timeline", &timeline.job_id))?;

        debug!(job_id = %timeline.job_id, entries = timeline.entries.len(), "Saved reconciliation timeline");
        Ok(())
    }

    async fn get_timeline(&self, job_id: &str) -> StoreResult<Option<ReconciliationTimeline>> {
        let record = sqlx::query_as::<_, TimelineRecord>(
            r#"
            SELECT job_id, district_id, target_month, entries_json, status_json, updated_at
            FROM reconciliation_timelines
            WHERE job_id = ?1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(log_db_error("get timeline", job_id))?;

        record.map(ReconciliationTimeline::try_from).transpose()
    }

    async fn get_config(&self) -> StoreResult<Option<ReconciliationConfig>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT config_json FROM reconciliation_config WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_config(&self, config: &ReconciliationConfig) -> StoreResult<()> {
        let json = serde_json::to_string(config)?;
        sqlx::query(
            r#"
            INSERT INTO reconciliation_config (id, config_json, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                config_json = excluded.config_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&json)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::*;
    use crate::domain::services::clock::FixedClock;
    use crate::persistence::{init_database, DatabaseConfig};
    use chrono::{Duration, NaiveDate, TimeZone};

    async fn store() -> SqliteReconciliationStore {
        let pool = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        SqliteReconciliationStore::new(pool)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 8, 0, 0).unwrap()
    }

    fn job(district: &str) -> ReconciliationJob {
        ReconciliationJob::new(
            district.to_string(),
            "2025-12".parse().unwrap(),
            15,
            TriggeredBy::Automatic,
            t0(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_job_round_trip_and_upsert() {
        let store = store().await;
        let mut j = job("D42");
        store.save_job(&j).await.unwrap();
        assert_eq!(store.get_job(&j.id).await.unwrap(), Some(j.clone()));

        j.extend(3, t0() + Duration::hours(1)).unwrap();
        store.save_job(&j).await.unwrap();
        let loaded = store.get_job(&j.id).await.unwrap().unwrap();
        assert_eq!(loaded.max_end_date, t0() + Duration::days(18));
        assert_eq!(store.get_all_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeline_round_trip() {
        let store = store().await;
        let j = job("D42");
        let mut timeline = ReconciliationTimeline::new(j.id.clone(), j.district_id.clone(), j.target_month);
        let source = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        timeline.push(ReconciliationEntry {
            date: t0(),
            source_data_date: source,
            changes: DataChanges::unchanged(t0(), source),
            is_significant: false,
            cache_updated: false,
            notes: Some("quiet".into()),
        });
        store.save_timeline(&timeline).await.unwrap();

        let loaded = store.get_timeline(&j.id).await.unwrap().unwrap();
        assert_eq!(loaded, timeline);
        assert!(store.get_timeline("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_jobs_by_district() {
        let store = store().await;
        store.save_job(&job("D1")).await.unwrap();
        store.save_job(&job("D1")).await.unwrap();
        store.save_job(&job("D2")).await.unwrap();

        assert_eq!(store.get_jobs_by_district("D1").await.unwrap().len(), 2);
        assert_eq!(store.get_jobs_by_district("D3").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_is_pairwise_and_skips_active() {
        let store = store().await;
        let mut done = job("D1");
        done.close(JobStatus::Completed, t0() + Duration::days(3));
        let active = job("D2");

        for j in [&done, &active] {
            store.save_job(j).await.unwrap();
            store
                .save_timeline(&ReconciliationTimeline::new(j.id.clone(), j.district_id.clone(), j.target_month))
                .await
                .unwrap();
        }

        let removed = store.cleanup_old_jobs(t0() + Duration::days(90)).await.unwrap();
        assert_eq!(removed, vec![done.id.clone()]);
        assert!(store.get_job(&done.id).await.unwrap().is_none());
        assert!(store.get_timeline(&done.id).await.unwrap().is_none());
        assert!(store.get_job(&active.id).await.unwrap().is_some());
        assert!(store.get_timeline(&active.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let store = store().await;
        assert!(store.get_config().await.unwrap().is_none());

        let config = ReconciliationConfig {
            stability_period_days: 4,
            ..Default::default()
        };
        store.save_config(&config).await.unwrap();
        store.save_config(&config).await.unwrap();
        assert_eq!(store.get_config().await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn test_job_and_timeline_saved_together() {
        let store = store().await;
        let mut j = job("D42");
        let mut timeline = ReconciliationTimeline::new(j.id.clone(), j.district_id.clone(), j.target_month);
        store.save_job_with_timeline(&j, &timeline).await.unwrap();

        j.close(JobStatus::Completed, t0() + Duration::days(4));
        timeline.status.phase = TimelinePhase::Completed;
        store.save_job_with_timeline(&j, &timeline).await.unwrap();

        assert_eq!(store.get_job(&j.id).await.unwrap(), Some(j.clone()));
        assert_eq!(store.get_timeline(&j.id).await.unwrap(), Some(timeline));
    }

    #[tokio::test]
    async fn test_failed_timeline_write_rolls_back_job() {
        let store = store().await;
        let j = job("D42");
        sqlx::query("DROP TABLE reconciliation_timelines")
            .execute(&store.pool)
            .await
            .unwrap();

        let timeline = ReconciliationTimeline::new(j.id.clone(), j.district_id.clone(), j.target_month);
        assert!(store.save_job_with_timeline(&j, &timeline).await.is_err());
        assert!(store.get_job(&j.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_updated_at_follows_clock() {
        let pool = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        let stamp = Utc.with_ymd_and_hms(2031, 5, 6, 7, 8, 9).unwrap();
        let store = SqliteReconciliationStore::with_clock(pool, Arc::new(FixedClock::new(stamp)));

        let j = job("D42");
        store
            .save_timeline(&ReconciliationTimeline::new(j.id.clone(), j.district_id.clone(), j.target_month))
            .await
            .unwrap();
        store.save_config(&ReconciliationConfig::default()).await.unwrap();

        let timeline_stamp: DateTime<Utc> =
            sqlx::query_scalar("SELECT updated_at FROM reconciliation_timelines WHERE job_id = ?1")
                .bind(&j.id)
                .fetch_one(&store.pool)
                .await
                .unwrap();
        let config_stamp: DateTime<Utc> =
            sqlx::query_scalar("SELECT updated_at FROM reconciliation_config WHERE id = 1")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(timeline_stamp, stamp);
        assert_eq!(config_stamp, stamp);
    }
}
