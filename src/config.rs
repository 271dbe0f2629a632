//! Light configuration: which device, what to call it, and how to reach it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::keepalive::DEFAULT_KEEPALIVE_INTERVAL;
use crate::{Error, Result};

/// Transport used to reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Run `gatttool` for every write
    Gatttool,
    /// Connect directly for every write, failing after the attempt budget
    Direct,
    /// Route every connection through a keep-alive worker
    #[default]
    KeepAlive,
}

/// Configuration of a single light
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightConfig {
    /// Bluetooth address (or platform peripheral id) of the controller
    pub address: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub backend: Backend,
    /// Executable used by the gatttool backend
    #[serde(default = "default_gatttool")]
    pub gatttool: String,
    /// Idle seconds before the keep-alive backend pings the device
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// Connection attempts per write; the backend's own default when unset
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_gatttool() -> String {
    crate::gatttool::DEFAULT_EXECUTABLE.to_string()
}

fn default_keepalive_interval_secs() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL.as_secs()
}

impl LightConfig {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        LightConfig {
            address: address.into(),
            name: name.into(),
            backend: Backend::default(),
            gatttool: default_gatttool(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            max_attempts: None,
        }
    }

    /// Parses and validates a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: LightConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn max_attempts_or(&self, default: u32) -> u32 {
        self.max_attempts.unwrap_or(default)
    }

    /// Checks every field a transport relies on
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("name must not be empty".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(Error::InvalidConfig("address must not be empty".to_string()));
        }
        if !is_mac_address(&self.address) && Uuid::parse_str(&self.address).is_err() {
            return Err(Error::InvalidConfig(format!(
                "address {:?} is neither a MAC address nor a peripheral id",
                self.address
            )));
        }
        if self.gatttool.trim().is_empty() {
            return Err(Error::InvalidConfig("gatttool must not be empty".to_string()));
        }
        if self.keepalive_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "keepalive_interval_secs must be positive".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::InvalidConfig("max_attempts must be positive".to_string()));
        }
        Ok(())
    }
}

/// Six colon-separated hex octets, e.g. `AA:BB:CC:DD:EE:FF`
fn is_mac_address(s: &str) -> bool {
    let octets: Vec<&str> = s.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}
