//! orbit.toml configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use orbit_scheduler::SchedulerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub store: StoreConfig,
    pub rpc: RpcConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the state and context databases.
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub call_timeout_ms: u64,
    /// Placement and action controllers.
    pub slow_call_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 60_000,
            slow_call_timeout_ms: 1_800_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Registration name of the synchronization service.
    pub controller_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            controller_name: "rsync".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OrchestratorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn state_path(&self) -> PathBuf {
        self.store.data_dir.join("state.redb")
    }

    pub fn context_path(&self) -> PathBuf {
        self.store.data_dir.join("context.redb")
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            call_timeout: Duration::from_millis(self.rpc.call_timeout_ms),
            slow_call_timeout: Duration::from_millis(self.rpc.slow_call_timeout_ms),
            sync_controller: self.sync.controller_name.clone(),
        }
    }
}
