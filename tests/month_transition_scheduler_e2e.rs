use chrono::{Duration, TimeZone, Utc};
use recon_monitor::domain::entities::TriggeredBy;
use recon_monitor::domain::services::change_detection::ChangeDetectionEngine;
use recon_monitor::domain::services::clock::FixedClock;
use recon_monitor::domain::services::config_provider::ReconciliationConfigService;
use recon_monitor::domain::services::orchestrator::ReconciliationOrchestrator;
use recon_monitor::domain::services::scheduler::ReconciliationScheduler;
use recon_monitor::persistence::cache::ReconciliationCache;
use recon_monitor::persistence::memory::InMemoryReconciliationStore;
use std::sync::Arc;

fn scheduler(clock: Arc<FixedClock>) -> Arc<ReconciliationScheduler> {
    let orchestrator = Arc::new(ReconciliationOrchestrator::new(
        Arc::new(InMemoryReconciliationStore::new()),
        Arc::new(ReconciliationCache::with_default_ttl()),
        Arc::new(ReconciliationConfigService::with_defaults()),
        Arc::new(ChangeDetectionEngine::with_clock(clock.clone())),
        clock,
    ));
    Arc::new(ReconciliationScheduler::new(orchestrator))
}

fn districts(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("D{}", i)).collect()
}

#[tokio::test]
async fn test_daily_ticks_across_a_month() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 2, 27, 3, 0, 0).unwrap()));
    let scheduler = scheduler(clock.clone());
    let ids = districts(3);

    let mut started_per_day = Vec::new();
    for _ in 0..12 {
        started_per_day.push(scheduler.auto_schedule_for_month_transition(&ids).await.unwrap());
        clock.advance(Duration::days(1));
    }

    // Feb 27, 28 idle; Mar 1 schedules all; Mar 2-5 dedup; Mar 6+ outside window
    assert_eq!(started_per_day, vec![0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

    let jobs = scheduler.get_scheduled_reconciliations(None).await.unwrap();
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|j| j.target_month.to_string() == "2026-02"));
}

#[tokio::test]
async fn test_year_boundary_targets_december() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2027, 1, 4, 0, 30, 0).unwrap()));
    let scheduler = scheduler(clock);

    scheduler
        .auto_schedule_for_month_transition(&districts(1))
        .await
        .unwrap();
    let jobs = scheduler.get_scheduled_reconciliations(Some("D1")).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].target_month.to_string(), "2026-12");
    assert_eq!(jobs[0].triggered_by, TriggeredBy::Automatic);
}

#[tokio::test]
async fn test_next_month_schedules_again() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()));
    let scheduler = scheduler(clock.clone());
    let ids = districts(2);

    assert_eq!(scheduler.auto_schedule_for_month_transition(&ids).await.unwrap(), 2);
    clock.set(Utc.with_ymd_and_hms(2026, 6, 2, 0, 0, 0).unwrap());
    assert_eq!(scheduler.auto_schedule_for_month_transition(&ids).await.unwrap(), 2);

    let d1 = scheduler.get_scheduled_reconciliations(Some("D1")).await.unwrap();
    let months: Vec<String> = d1.iter().map(|j| j.target_month.to_string()).collect();
    assert_eq!(months, vec!["2026-04".to_string(), "2026-05".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ticks_for_disjoint_districts_run_concurrently() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 7, 2, 0, 0, 0).unwrap()));
    let scheduler = scheduler(clock);

    let batches: Vec<Vec<String>> = (0..4)
        .map(|b| (0..5).map(|i| format!("D{}-{}", b, i)).collect())
        .collect();
    let ticks = batches.into_iter().map(|batch| {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.auto_schedule_for_month_transition(&batch).await })
    });

    let total: usize = futures_util::future::join_all(ticks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .sum();
    assert_eq!(total, 20);
    assert_eq!(scheduler.get_scheduled_reconciliations(None).await.unwrap().len(), 20);
}
