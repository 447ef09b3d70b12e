use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::info;

use idp_slo::Result;

use crate::{
    kv::{Backend, KvStorage, DEFAULT_TIMEOUT},
    mariadb::MariaDbBackend,
    memory::MemoryBackend,
    Storage,
};

/// Which backend to open and how long a single backend call may take.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    Memory,
    Mariadb(MariaDbConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MariaDbConfig {
    pub url: String,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,
    #[serde(default)]
    pub run_migrations: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_max_size() -> u32 {
    10
}

fn default_min_idle() -> u32 {
    1
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub async fn open_kv(&self) -> Result<KvStorage> {
        let backend: Arc<dyn Backend> = match &self.backend {
            BackendConfig::Memory => {
                info!("opening in-memory storage");
                Arc::new(MemoryBackend::new())
            }
            BackendConfig::Mariadb(c) => {
                info!("opening mariadb storage");
                Arc::new(MariaDbBackend::connect(c, self.timeout()).await?)
            }
        };
        Ok(KvStorage::new(backend).with_timeout(self.timeout()))
    }

    pub async fn open(&self) -> Result<Arc<dyn Storage>> {
        Ok(Arc::new(self.open_kv().await?))
    }
}
