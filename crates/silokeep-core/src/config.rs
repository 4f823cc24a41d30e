//! silokeep.toml store configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// How membership rows are laid out across collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipLayout {
    /// One collection per deployment.
    #[default]
    PerDeployment,
    /// One shared collection, partitioned by a `DeploymentId` field.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prepended to every collection name.
    pub collection_prefix: String,
    /// Scope for reminder rows.
    pub service_id: String,
    pub membership_layout: MembershipLayout,
    /// How long a dead silo's row is kept before it becomes defunct.
    pub defunct_retention_secs: u64,
    /// On-disk database file for the persistent backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection_prefix: String::new(),
            service_id: "default".to_string(),
            membership_layout: MembershipLayout::PerDeployment,
            defunct_retention_secs: 7 * 24 * 60 * 60,
            database_path: None,
        }
    }
}

impl StoreConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_id.trim().is_empty() {
            return Err(ConfigError::Invalid("service_id must not be empty".to_string()));
        }
        if self.collection_prefix.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "collection_prefix {:?} contains whitespace",
                self.collection_prefix
            )));
        }
        Ok(())
    }

    pub fn defunct_retention(&self) -> Duration {
        Duration::from_secs(self.defunct_retention_secs)
    }
}
