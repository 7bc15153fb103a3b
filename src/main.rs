use recon_monitor::config::{ReconciliationConfig, ServiceConfig};
use recon_monitor::domain::services::change_detection::ChangeDetectionEngine;
use recon_monitor::domain::services::clock::{Clock, SystemClock};
use recon_monitor::domain::services::config_provider::{ConfigProvider, ReconciliationConfigService};
use recon_monitor::domain::services::orchestrator::ReconciliationOrchestrator;
use recon_monitor::domain::services::scheduler::ReconciliationScheduler;
use recon_monitor::persistence::cache::ReconciliationCache;
use recon_monitor::persistence::repository::SqliteReconciliationStore;
use recon_monitor::persistence::{init_database, DatabaseConfig};
use recon_monitor::task_runner::{run_periodic, RetryPolicy};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env file: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recon_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let service_config = ServiceConfig::from_env();
    let database_config = DatabaseConfig::from_env();

    info!("Reconciliation monitor starting...");
    if service_config.district_ids.is_empty() {
        warn!("RECONCILIATION_DISTRICTS is empty, the scheduler will not start any job");
    } else {
        info!("Tracking {} districts", service_config.district_ids.len());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pool = init_database(&database_config).await?;
    let store = Arc::new(SqliteReconciliationStore::with_clock(pool, clock.clone()));

    let config_service =
        Arc::new(ReconciliationConfigService::load(store.clone(), ReconciliationConfig::from_env()).await?);
    let config = config_service.get_config().await;

    let orchestrator = Arc::new(ReconciliationOrchestrator::new(
        store,
        Arc::new(ReconciliationCache::new(
            service_config.cache_capacity,
            service_config.cache_ttl,
        )),
        config_service,
        Arc::new(ChangeDetectionEngine::with_clock(clock.clone())),
        clock,
    ));
    let scheduler = Arc::new(
        ReconciliationScheduler::new(orchestrator.clone()).with_cutoff_day(service_config.schedule_cutoff_day),
    );

    let policy = RetryPolicy {
        max_consecutive_failures: service_config.max_consecutive_failures,
        ..RetryPolicy::default()
    };
    let districts = service_config.district_ids.clone();
    let interval = config.check_interval();
    info!("Scheduler tick every {:?}", interval);

    let scheduler_task = run_periodic("month_transition_scheduler", policy, interval, move || {
        let scheduler = scheduler.clone();
        let districts = districts.clone();
        async move {
            let started = scheduler.auto_schedule_for_month_transition(&districts).await?;
            if started > 0 {
                info!("Scheduled {} new reconciliation jobs", started);
            }
            Ok::<(), recon_monitor::domain::errors::ReconciliationError>(())
        }
    });

    let shutdown_signal = async {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Reconciliation monitor started. Press Ctrl+C to stop.");
    tokio::select! {
        result = scheduler_task => {
            if let Err(e) = result {
                error!("Scheduler stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal => {
            info!("Shutting down gracefully...");
        }
    }

    let stats = orchestrator.cache_stats().await;
    info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = format!("{:.2}%", stats.hit_rate()),
        "Shutdown complete"
    );
    Ok(())
}
