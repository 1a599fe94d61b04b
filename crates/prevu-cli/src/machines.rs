//! Registry of provisioned environment machines
//!
//! `~/.prevu/machines.yaml` maps environment ids to connection metadata:
//!
//! ```yaml
//! machines:
//!   acme-main:
//!     public_ip_address: 203.0.113.10
//!     ssh_username: ubuntu
//!     key_alias: prevu
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub public_ip_address: String,
    pub ssh_username: String,
    #[serde(default = "default_key_alias")]
    pub key_alias: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
}

fn default_key_alias() -> String {
    "prevu".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MachineRegistry {
    #[serde(default)]
    machines: HashMap<String, Machine>,
}

impl MachineRegistry {
    pub fn load_default() -> Result<Self> {
        Self::load(&default_registry_path()?)
    }

    /// Loads the registry file; a missing file is an empty registry, so
    /// unknown environments surface as "no machine found" rather than a read
    /// error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read machine registry {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse machine registry {}", path.display()))
    }

    /// Connection metadata for an environment, or `None` when it does not
    /// exist.
    pub fn machine(&self, env_id: &str) -> Option<&Machine> {
        self.machines.get(env_id)
    }
}

fn default_registry_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".prevu").join("machines.yaml"))
}
