use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ReconciliationConfig;
use crate::domain::errors::ReconciliationError;
use crate::domain::repositories::ReconciliationStore;

/// Partial update of the significance thresholds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdsUpdate {
    pub membership_percent: Option<f64>,
    pub club_count_absolute: Option<u32>,
    pub distinguished_percent: Option<f64>,
}

/// Partial configuration update; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    pub max_reconciliation_days: Option<u32>,
    pub stability_period_days: Option<u32>,
    pub check_frequency_hours: Option<u32>,
    pub significant_change_thresholds: Option<ThresholdsUpdate>,
    pub auto_extension_enabled: Option<bool>,
    pub max_extension_days: Option<u32>,
}

impl ConfigUpdate {
    pub fn apply_to(&self, base: &ReconciliationConfig) -> ReconciliationConfig {
        let mut merged = base.clone();
        if let Some(v) = self.max_reconciliation_days {
            merged.max_reconciliation_days = v;
        }
        if let Some(v) = self.stability_period_days {
            merged.stability_period_days = v;
        }
        if let Some(v) = self.check_frequency_hours {
            merged.check_frequency_hours = v;
        }
        if let Some(t) = &self.significant_change_thresholds {
            let thresholds = &mut merged.significant_change_thresholds;
            if let Some(v) = t.membership_percent {
                thresholds.membership_percent = v;
            }
            if let Some(v) = t.club_count_absolute {
                thresholds.club_count_absolute = v;
            }
            if let Some(v) = t.distinguished_percent {
                thresholds.distinguished_percent = v;
            }
        }
        if let Some(v) = self.auto_extension_enabled {
            merged.auto_extension_enabled = v;
        }
        if let Some(v) = self.max_extension_days {
            merged.max_extension_days = v;
        }
        merged
    }
}

/// Source of the live reconciliation configuration.
///
/// Readers call `get_config` at the point of use, so an update applies to
/// every later cycle.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn get_config(&self) -> ReconciliationConfig;

    async fn update_config(&self, update: ConfigUpdate) -> Result<ReconciliationConfig, ReconciliationError>;

    async fn reset_to_defaults(&self) -> Result<ReconciliationConfig, ReconciliationError>;
}

pub struct ReconciliationConfigService {
    config: RwLock<ReconciliationConfig>,
    store: Option<Arc<dyn ReconciliationStore>>,
}

impl ReconciliationConfigService {
    /// In-memory provider starting from `config`.
    pub fn new(config: ReconciliationConfig) -> Result<Self, ReconciliationError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            store: None,
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: RwLock::new(ReconciliationConfig::default()),
            store: None,
        }
    }

    /// Provider backed by the store's configuration record.
    ///
    /// A missing record is initialised with `fallback`; a persisted record that
    /// fails validation is replaced by `fallback`.
    pub async fn load(
        store: Arc<dyn ReconciliationStore>,
        fallback: ReconciliationConfig,
    ) -> Result<Self, ReconciliationError> {
        fallback.validate()?;

        let config = match store.get_config().await? {
            Some(persisted) => match persisted.validate() {
                Ok(()) => persisted,
                Err(e) => {
                    warn!("Persisted reconciliation config is invalid ({}), replacing it", e);
                    store.save_config(&fallback).await?;
                    fallback
                }
            },
            None => {
                store.save_config(&fallback).await?;
                fallback
            }
        };

        info!(
            max_reconciliation_days = config.max_reconciliation_days,
            stability_period_days = config.stability_period_days,
            auto_extension_enabled = config.auto_extension_enabled,
            "Reconciliation configuration loaded"
        );

        Ok(Self {
            config: RwLock::new(config),
            store: Some(store),
        })
    }

    /// Merge, validate and persist under the write lock so concurrent updates
    /// cannot interleave.
    async fn replace_with(
        &self,
        build: impl FnOnce(&ReconciliationConfig) -> ReconciliationConfig + Send,
    ) -> Result<ReconciliationConfig, ReconciliationError> {
        let mut current = self.config.write().await;
        let next = build(&current);
        next.validate()?;

        if let Some(store) = &self.store {
            store.save_config(&next).await?;
        }
        *current = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl ConfigProvider for ReconciliationConfigService {
    async fn get_config(&self) -> ReconciliationConfig {
        self.config.read().await.clone()
    }

    async fn update_config(&self, update: ConfigUpdate) -> Result<ReconciliationConfig, ReconciliationError> {
        let updated = self.replace_with(|current| update.apply_to(current)).await?;
        info!(update = ?update, "Reconciliation configuration updated");
        Ok(updated)
    }

    async fn reset_to_defaults(&self) -> Result<ReconciliationConfig, ReconciliationError> {
        let defaults = self
            .replace_with(|_| ReconciliationConfig::default())
            .await?;
        info!("Reconciliation configuration reset to defaults");
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::InMemoryReconciliationStore;

    #[tokio::test]
    async fn test_update_merges_partial_fields() {
        let service = ReconciliationConfigService::with_defaults();
        let updated = service
            .update_config(ConfigUpdate {
                stability_period_days: Some(5),
                significant_change_thresholds: Some(ThresholdsUpdate {
                    membership_percent: Some(2.5),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.stability_period_days, 5);
        assert_eq!(updated.significant_change_thresholds.membership_percent, 2.5);
        assert_eq!(updated.significant_change_thresholds.club_count_absolute, 1);
        assert_eq!(updated.max_reconciliation_days, 15);
        assert_eq!(service.get_config().await, updated);
    }

    #[tokio::test]
    async fn test_invalid_update_leaves_config_unchanged() {
        let service = ReconciliationConfigService::with_defaults();
        let result = service
            .update_config(ConfigUpdate {
                stability_period_days: Some(30),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(ReconciliationError::Validation(_))));
        assert_eq!(service.get_config().await, ReconciliationConfig::default());
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = ReconciliationConfig {
            max_extension_days: 0,
            ..Default::default()
        };
        assert!(ReconciliationConfigService::new(config).is_err());
    }

    #[tokio::test]
    async fn test_load_persists_and_restores() {
        let store = Arc::new(InMemoryReconciliationStore::new());

        let service = ReconciliationConfigService::load(store.clone(), ReconciliationConfig::default())
            .await
            .unwrap();
        service
            .update_config(ConfigUpdate {
                max_extension_days: Some(9),
                ..Default::default()
            })
            .await
            .unwrap();

        let reloaded = ReconciliationConfigService::load(store, ReconciliationConfig::default())
            .await
            .unwrap();
        assert_eq!(reloaded.get_config().await.max_extension_days, 9);
    }

    #[tokio::test]
    async fn test_reset_to_defaults() {
        let service = ReconciliationConfigService::with_defaults();
        service
            .update_config(ConfigUpdate {
                auto_extension_enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        let reset = service.reset_to_defaults().await.unwrap();
        assert!(reset.auto_extension_enabled);
    }
}
