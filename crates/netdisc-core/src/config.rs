//! Configuration file support for discovery
//!
//! Loads and validates discovery configuration from TOML files.
//!
//! ```toml
//! [worker]
//! max_concurrent_devices = 16
//!
//! [cache]
//! raw_ttl_secs = 900
//!
//! [commands.arista_eos]
//! cdp_neighbors = "show lldp neighbors detail"
//! ```

use crate::commands::CommandCatalog;
use crate::error::{DiscoveryError, Result};
use crate::retry::RetryPolicy;
use netdisc_types::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Worker pool and retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum devices discovered at once
    #[serde(default = "default_max_concurrent_devices")]
    pub max_concurrent_devices: usize,

    /// Attempts per command, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on the retry delay in milliseconds
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Raw response freshness window in seconds
    #[serde(default = "default_raw_ttl_secs")]
    pub raw_ttl_secs: u64,
}

/// Job registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// How long settled jobs stay pollable, in seconds
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

/// Shell transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Shell command run per device command; `{address}`, `{device}` and
    /// `{command}` are substituted
    #[serde(default = "default_command_template")]
    pub command_template: String,

    /// Per-command timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Complete discovery configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Per-platform command overrides: platform -> data-type -> command
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, BTreeMap<String, String>>,
}

// Default functions
fn default_max_concurrent_devices() -> usize {
    8
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_retry_backoff_max_ms() -> u64 {
    5000
}

fn default_raw_ttl_secs() -> u64 {
    1800
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_command_template() -> String {
    "ssh -o BatchMode=yes {address} {command}".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

// Default implementations
impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_devices: default_max_concurrent_devices(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            raw_ttl_secs: default_raw_ttl_secs(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            command_template: default_command_template(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                DiscoveryError::config(
                    path.display().to_string(),
                    format!("failed to parse config file: {}", e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(DiscoveryError::config(path.display().to_string(), e.to_string())),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| {
            DiscoveryError::config("config", format!("failed to serialize config: {}", e))
        })?;

        fs::write(path, content)
            .map_err(|e| DiscoveryError::config(path.display().to_string(), e.to_string()))
    }

    /// Get raw cache TTL as Duration
    pub fn raw_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.raw_ttl_secs)
    }

    /// Get job retention as Duration
    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.jobs.retention_secs)
    }

    /// Get per-command transport timeout as Duration
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.worker.retry_attempts,
            backoff: Duration::from_millis(self.worker.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.worker.retry_backoff_max_ms),
        }
    }

    /// Builds the command catalog with the configured overrides applied.
    pub fn command_catalog(&self) -> Result<CommandCatalog> {
        let mut overrides = BTreeMap::new();
        for (platform, commands) in &self.commands {
            let mut parsed = BTreeMap::new();
            for (name, command) in commands {
                let data_type = name.parse::<DataType>().map_err(|e| {
                    DiscoveryError::config(format!("commands.{}.{}", platform, name), e.to_string())
                })?;
                parsed.insert(data_type, command.clone());
            }
            overrides.insert(platform.clone(), parsed);
        }
        Ok(CommandCatalog::with_overrides(&overrides))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker.max_concurrent_devices == 0 {
            return Err(DiscoveryError::config(
                "worker.max_concurrent_devices",
                "must be > 0",
            ));
        }

        if self.worker.retry_attempts == 0 {
            return Err(DiscoveryError::config("worker.retry_attempts", "must be > 0"));
        }

        if self.worker.retry_backoff_max_ms < self.worker.retry_backoff_ms {
            return Err(DiscoveryError::config(
                "worker.retry_backoff_max_ms",
                "must be >= retry_backoff_ms",
            ));
        }

        if self.cache.raw_ttl_secs == 0 {
            return Err(DiscoveryError::config("cache.raw_ttl_secs", "must be > 0"));
        }

        if self.transport.timeout_secs == 0 {
            return Err(DiscoveryError::config("transport.timeout_secs", "must be > 0"));
        }

        if !self.transport.command_template.contains("{command}") {
            return Err(DiscoveryError::config(
                "transport.command_template",
                "must contain {command}",
            ));
        }

        self.command_catalog().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdisc_types::Platform;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.worker.max_concurrent_devices, 8);
        assert_eq!(config.worker.retry_attempts, 3);
        assert_eq!(config.cache.raw_ttl_secs, 1800);
        assert_eq!(config.jobs.retention_secs, 3600);
        assert!(config.commands.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_accessors() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.raw_ttl(), Duration::from_secs(1800));
        assert_eq!(config.job_retention(), Duration::from_secs(3600));
        assert_eq!(config.transport_timeout(), Duration::from_secs(30));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[worker]
max_concurrent_devices = 32

[cache]
raw_ttl_secs = 60

[commands.arista_eos]
cdp_neighbors = "show lldp neighbors detail"
mac-table = ""
"#;
        let config: DiscoveryConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.worker.max_concurrent_devices, 32);
        assert_eq!(config.cache.raw_ttl_secs, 60);
        // Unspecified values should use defaults
        assert_eq!(config.worker.retry_attempts, 3);
        assert_eq!(config.transport.timeout_secs, 30);

        let catalog = config.command_catalog().unwrap();
        assert_eq!(
            catalog.command(&Platform::AristaEos, DataType::CdpNeighbors),
            Some("show lldp neighbors detail")
        );
        assert_eq!(catalog.command(&Platform::AristaEos, DataType::MacTable), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DiscoveryConfig::default();
        config.worker.max_concurrent_devices = 0;
        assert!(config.validate().is_err());

        let mut config = DiscoveryConfig::default();
        config.cache.raw_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = DiscoveryConfig::default();
        config.transport.command_template = "ssh {address}".to_string();
        assert!(matches!(
            config.validate(),
            Err(DiscoveryError::Config { ref field, .. }) if field == "transport.command_template"
        ));

        let mut config = DiscoveryConfig::default();
        config
            .commands
            .entry("cisco_ios".to_string())
            .or_default()
            .insert("lldp".to_string(), "show lldp neighbors".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netdisc.toml");

        let mut config = DiscoveryConfig::default();
        config.worker.max_concurrent_devices = 4;
        config.jobs.retention_secs = 120;
        config.save(&path).unwrap();

        let loaded = DiscoveryConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_errors() {
        let config = DiscoveryConfig::load_or_default("/nonexistent/netdisc.toml").unwrap();
        assert_eq!(config, DiscoveryConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[worker\nmax_concurrent_devices = ").unwrap();
        assert!(matches!(
            DiscoveryConfig::load_or_default(&path),
            Err(DiscoveryError::Config { .. })
        ));
    }
}
