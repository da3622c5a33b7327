//! Configuration tree
//!
//! One YAML file composing the component configs. Every section is
//! optional: an empty file gives the echo storage, no agents, and the
//! default listen address.
//!
//! ```yaml
//! server:
//!   listen: "127.0.0.1:2111"
//! storage:
//!   sqlite:
//!     path: /var/lib/lodge/lodge.db
//! file:
//!   offsets: /var/lib/lodge/offsets.yaml
//!   limit: 100
//! agents:
//!   nginx:
//!     fields: [...]
//!     file: { path: ..., format: plain, regex: ... }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use lodge_agent::AgentConfig;
use lodge_inputs::FileRegistryConfig;
use lodge_server::ServerConfig;
use lodge_storage::StorageConfig;

/// Library directory holding the agent's own state files.
const LIB_DIR: &str = "/var/lib/lodge";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub file: FileRegistryConfig,

    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
}

impl Config {
    /// Load and parse the configuration file, filling in library-directory
    /// defaults for paths left unset.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read config file '{}'", path.display()))?;

        let mut config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parse config file '{}'", path.display()))?;
        config.apply_defaults();

        Ok(config)
    }

    fn apply_defaults(&mut self) {
        if self.file.offsets.is_none() {
            self.file.offsets = Some(format!("{LIB_DIR}/offsets.yaml"));
        }

        if let Some(sqlite) = &mut self.storage.sqlite {
            if sqlite.path.is_empty() {
                sqlite.path = format!("{LIB_DIR}/lodge.db");
            }
        }
    }
}
