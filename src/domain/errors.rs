use thiserror::Error;

/// Malformed input rejected before any state is touched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid month: {0}")]
    InvalidMonth(String),

    #[error("Data month {data_month} is after collection month {collection_month}")]
    DataMonthAfterCollection {
        data_month: String,
        collection_month: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Statistics belong to different districts: {current} vs {cached}")]
    DistrictMismatch { current: String, cached: String },

    #[error("District id must not be empty")]
    EmptyDistrictId,

    #[error("Extension of {requested} days exceeds the maximum of {max} days")]
    ExtensionTooLarge { requested: i64, max: u32 },

    #[error("Deadline {days} days out is outside the supported date range")]
    DeadlineOutOfRange { days: u32 },
}

/// Failures of the persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("Reconciliation job not found: {0}")]
    JobNotFound(String),

    #[error("Stability period not met: {days_stable} of {required} stable days")]
    StabilityPeriodNotMet { days_stable: u32, required: u32 },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconciliationError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconciliationError::JobNotFound(_))
    }
}
