//! Router configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dispatch::MetaManager;
use crate::fs_manager::FsContentsManager;
use crate::registry::BackendRegistry;
use crate::resource::ResourceSpec;
use multifs_common::{Error, Result};
use multifs_storage::{LocalProvider, StorageProvider};

/// Server-side configuration, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Directory served as the default drive.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Resources every client can see.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// Allow-list for client resource URLs. Each pattern must match the
    /// whole URL. Empty allows everything.
    #[serde(default)]
    pub resource_validators: Vec<String>,
    /// Accept resources submitted by clients at all.
    #[serde(default = "default_true")]
    pub allow_user_resources: bool,
    /// Include error messages in resource records.
    #[serde(default)]
    pub verbose: bool,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            resources: Vec::new(),
            resource_validators: Vec::new(),
            allow_user_resources: true,
            verbose: false,
        }
    }
}

impl RouterConfig {
    /// Load configuration from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::InvalidInput(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Build a manager whose default drive serves `root_dir`.
    ///
    /// # Errors
    /// - `root_dir` does not exist or is not a directory
    pub async fn build_manager(&self) -> Result<MetaManager> {
        let root = LocalProvider::new(&self.root_dir, false);
        root.probe().await?;
        let default = FsContentsManager::new(Arc::new(root), true);
        Ok(MetaManager::new(BackendRegistry::new(default)))
    }
}
