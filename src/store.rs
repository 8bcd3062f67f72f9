//! An in-memory `ConfigStore`.

use crate::core::{AlertConfiguration, ConfigStore, OrgId};
use crate::errors::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Keeps the latest configuration per organization.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    configs: RwLock<HashMap<OrgId, AlertConfiguration>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `config`.
    pub fn with_config(config: AlertConfiguration) -> Self {
        let mut configs = HashMap::new();
        configs.insert(config.org_id, config);
        Self {
            configs: RwLock::new(configs),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_latest_config(&self, org_id: OrgId) -> Result<AlertConfiguration, StoreError> {
        self.configs
            .read()
            .await
            .get(&org_id)
            .cloned()
            .ok_or(StoreError::NotFound(org_id))
    }

    async fn save_config(&self, config: AlertConfiguration) -> Result<(), StoreError> {
        debug!(org_id = config.org_id, hash = %config.hash, "Saving Alertmanager configuration.");
        self.configs.write().await.insert(config.org_id, config);
        Ok(())
    }
}
