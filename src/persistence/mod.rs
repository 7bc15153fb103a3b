//! Persistence Layer
//!
//! Durable storage for reconciliation jobs, their timelines and the live
//! reconciliation configuration. Uses SQLite via sqlx.
//!
//! # Database Schema
//!
//! ## reconciliation_jobs
//! - id: job id (`recon_<district>_<month>_<uuid>`)
//! - district_id, target_month (YYYY-MM)
//! - status: "active", "completed", "failed", "cancelled"
//! - start_date, max_end_date, end_date, finalized_date
//! - triggered_by: "manual" or "automatic"
//! - failure_reason: optional text
//! - created_at, updated_at
//!
//! ## reconciliation_timelines
//! - job_id: one row per job
//! - entries_json: ordered cycle entries
//! - status_json: latest timeline status
//!
//! ## reconciliation_config
//! - single row (id = 1) holding the configuration as JSON

pub mod cache;
pub mod memory;
pub mod models;
pub mod repository;
#[cfg(test)]
pub(crate) mod test_support;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::domain::errors::StoreError;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Initialize the database connection pool and run migrations
///
/// # Errors
/// Returns error if the data directory cannot be created, the connection
/// fails or a migration fails
pub async fn init_database(config: &DatabaseConfig) -> Result<DbPool, StoreError> {
    info!("Initializing database: {}", config.url);

    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(sqlx::Error::Configuration(Box::new(e))))?;
        }
    }

    let mut options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
    if !config.log_queries {
        options = options.disable_statement_logging();
    }

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections.max(1));
    if config.is_in_memory() {
        // Every in-memory connection is its own database; keep the single one alive.
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = pool_options.connect_with(options).await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");
    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), StoreError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reconciliation_jobs (
            id TEXT PRIMARY KEY,
            district_id TEXT NOT NULL,
            target_month TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('active', 'completed', 'failed', 'cancelled')),
            start_date DATETIME NOT NULL,
            max_end_date DATETIME NOT NULL,
            end_date DATETIME,
            finalized_date DATETIME,
            triggered_by TEXT NOT NULL CHECK(triggered_by IN ('manual', 'automatic')),
            failure_reason TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reconciliation_timelines (
            job_id TEXT PRIMARY KEY,
            district_id TEXT NOT NULL,
            target_month TEXT NOT NULL,
            entries_json TEXT NOT NULL,
            status_json TEXT NOT NULL,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reconciliation_config (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            config_json TEXT NOT NULL,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recon_jobs_district ON reconciliation_jobs(district_id, target_month)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_recon_jobs_status ON reconciliation_jobs(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_recon_jobs_created_at ON reconciliation_jobs(created_at)")
        .execute(pool)
        .await?;

    info!("✓ Database migrations completed successfully");
    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/reconciliation.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Enable query logging
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/reconciliation.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Private in-memory database, used by tests
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            log_queries: false,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }

    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_connections);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.log_queries);

        Self {
            url,
            max_connections,
            log_queries,
        }
    }
}
