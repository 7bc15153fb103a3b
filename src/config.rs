use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::domain::errors::ValidationError;

/// Thresholds above which a difference between two snapshots is significant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificantChangeThresholds {
    /// Absolute membership percent change (e.g. 1.0 = 1%)
    pub membership_percent: f64,
    /// Absolute change in total club count
    pub club_count_absolute: u32,
    /// Absolute percent change in distinguished clubs
    pub distinguished_percent: f64,
}

impl Default for SignificantChangeThresholds {
    fn default() -> Self {
        Self {
            membership_percent: 1.0,
            club_count_absolute: 1,
            distinguished_percent: 2.0,
        }
    }
}

/// Reconciliation window policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationConfig {
    pub max_reconciliation_days: u32, // Hard cap on job age
    pub stability_period_days: u32,   // Consecutive quiet cycles required to finalize
    pub check_frequency_hours: u32,
    pub significant_change_thresholds: SignificantChangeThresholds,
    pub auto_extension_enabled: bool,
    pub max_extension_days: u32, // Upper bound for a single extension
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_reconciliation_days: 15,
            stability_period_days: 3,
            check_frequency_hours: 24,
            significant_change_thresholds: SignificantChangeThresholds::default(),
            auto_extension_enabled: true,
            max_extension_days: 5,
        }
    }
}

impl ReconciliationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |msg: &str| Err(ValidationError::InvalidConfiguration(msg.to_string()));

        if self.max_reconciliation_days == 0 {
            return invalid("maxReconciliationDays must be greater than 0");
        }
        if self.stability_period_days == 0 {
            return invalid("stabilityPeriodDays must be greater than 0");
        }
        if self.check_frequency_hours == 0 {
            return invalid("checkFrequencyHours must be greater than 0");
        }
        if self.max_extension_days == 0 {
            return invalid("maxExtensionDays must be greater than 0");
        }
        if self.stability_period_days > self.max_reconciliation_days {
            return invalid("stabilityPeriodDays must not exceed maxReconciliationDays");
        }

        let t = &self.significant_change_thresholds;
        if !(t.membership_percent.is_finite() && t.membership_percent > 0.0) {
            return invalid("membershipPercent threshold must be greater than 0");
        }
        if t.club_count_absolute == 0 {
            return invalid("clubCountAbsolute threshold must be greater than 0");
        }
        if !(t.distinguished_percent.is_finite() && t.distinguished_percent > 0.0) {
            return invalid("distinguishedPercent threshold must be greater than 0");
        }

        Ok(())
    }

    /// Days added by one automatic extension.
    pub fn auto_extension_days(&self) -> u32 {
        self.stability_period_days.min(self.max_extension_days)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_frequency_hours as u64 * 3600)
    }

    /// Load configuration from environment variables
    ///
    /// Unparsable values are logged and the default is kept. The merged
    /// result is validated; an invalid combination falls back to defaults.
    pub fn from_env() -> ReconciliationConfig {
        let mut config = ReconciliationConfig::default();

        if let Some(v) = env_parse::<u32>("RECONCILIATION_MAX_DAYS", |v| *v > 0) {
            config.max_reconciliation_days = v;
        }
        if let Some(v) = env_parse::<u32>("RECONCILIATION_STABILITY_DAYS", |v| *v > 0) {
            config.stability_period_days = v;
        }
        if let Some(v) = env_parse::<u32>("RECONCILIATION_CHECK_FREQUENCY_HOURS", |v| *v > 0) {
            config.check_frequency_hours = v;
        }
        if let Some(v) = env_parse::<f64>("RECONCILIATION_MEMBERSHIP_THRESHOLD_PERCENT", |v| *v > 0.0) {
            config.significant_change_thresholds.membership_percent = v;
        }
        if let Some(v) = env_parse::<u32>("RECONCILIATION_CLUB_COUNT_THRESHOLD", |v| *v > 0) {
            config.significant_change_thresholds.club_count_absolute = v;
        }
        if let Some(v) = env_parse::<f64>("RECONCILIATION_DISTINGUISHED_THRESHOLD_PERCENT", |v| *v > 0.0) {
            config.significant_change_thresholds.distinguished_percent = v;
        }
        if let Ok(enabled) = std::env::var("RECONCILIATION_AUTO_EXTENSION") {
            config.auto_extension_enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }
        if let Some(v) = env_parse::<u32>("RECONCILIATION_MAX_EXTENSION_DAYS", |v| *v > 0) {
            config.max_extension_days = v;
        }

        if let Err(e) = config.validate() {
            tracing::warn!("Reconciliation configuration from environment rejected: {}, using defaults", e);
            return ReconciliationConfig::default();
        }

        config
    }
}

/// Runtime settings of the reconciliation daemon
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub district_ids: Vec<String>,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    /// Last day of month on which month-transition jobs are scheduled
    pub schedule_cutoff_day: u32,
    pub max_consecutive_failures: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            district_ids: Vec::new(),
            cache_ttl: Duration::from_secs(300), // 5 minute cache TTL
            cache_capacity: 1000,
            schedule_cutoff_day: 5,
            max_consecutive_failures: 5,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> ServiceConfig {
        let mut config = ServiceConfig::default();

        if let Ok(districts) = std::env::var("RECONCILIATION_DISTRICTS") {
            config.district_ids = parse_district_list(&districts);
        }
        if let Some(v) = env_parse::<u64>("RECONCILIATION_CACHE_TTL_SECONDS", |v| *v > 0) {
            config.cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("RECONCILIATION_CACHE_CAPACITY", |v| *v > 0) {
            config.cache_capacity = v;
        }
        if let Some(v) = env_parse::<u32>("RECONCILIATION_SCHEDULE_CUTOFF_DAY", |v| (1..=28).contains(v)) {
            config.schedule_cutoff_day = v;
        }
        if let Some(v) = env_parse::<u32>("RECONCILIATION_MAX_CONSECUTIVE_FAILURES", |v| *v > 0) {
            config.max_consecutive_failures = v;
        }

        config
    }
}

fn parse_district_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn env_parse<T>(key: &str, valid: impl Fn(&T) -> bool) -> Option<T>
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => Some(value),
        Ok(value) => {
            tracing::warn!("Out of range {} value: {}, using default", key, value);
            None
        }
        Err(e) => {
            tracing::warn!("Failed to parse {} '{}': {}, using default", key, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ReconciliationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_reconciliation_days, 15);
        assert_eq!(config.stability_period_days, 3);
        assert!(config.auto_extension_enabled);
    }

    #[test]
    fn test_validate_rejects_zero_fields() {
        let mut config = ReconciliationConfig::default();
        config.check_frequency_hours = 0;
        assert!(config.validate().is_err());

        let mut config = ReconciliationConfig::default();
        config.significant_change_thresholds.membership_percent = 0.0;
        assert!(config.validate().is_err());

        let mut config = ReconciliationConfig::default();
        config.significant_change_thresholds.club_count_absolute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_stability_longer_than_window() {
        let config = ReconciliationConfig {
            max_reconciliation_days: 3,
            stability_period_days: 4,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stabilityPeriodDays"));
    }

    #[test]
    fn test_auto_extension_days_capped() {
        let config = ReconciliationConfig {
            stability_period_days: 7,
            max_extension_days: 3,
            ..Default::default()
        };
        assert_eq!(config.auto_extension_days(), 3);
        assert_eq!(ReconciliationConfig::default().auto_extension_days(), 3);
    }

    #[test]
    fn test_config_serializes_camel_case() {
        let json = serde_json::to_value(ReconciliationConfig::default()).unwrap();
        assert_eq!(json["maxReconciliationDays"], 15);
        assert_eq!(json["significantChangeThresholds"]["clubCountAbsolute"], 1);
    }

    #[test]
    fn test_parse_district_list() {
        assert_eq!(
            parse_district_list(" 42, 61 ,,F "),
            vec!["42".to_string(), "61".to_string(), "F".to_string()]
        );
    }

    #[test]
    fn test_service_config_default() {
        let config = ServiceConfig::default();
        assert_eq!(config.schedule_cutoff_day, 5);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
    }
}
