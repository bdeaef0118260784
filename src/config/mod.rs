//! Configuration
//!
//! JSON configuration file for the `dirpart` binary:
//! - `snapshot_path` is required; every other key has a default
//! - Loading always validates; an invalid file never yields a `Config`
//! - Library code sees only the derived policies, never the file

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;
use crate::replica::ServerVersion;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// JSON directory snapshot the CLI operates on (required)
    pub snapshot_path: PathBuf,

    /// Minimum log severity (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Version floor for primary replica-set members (optional, default "5.2")
    #[serde(default = "default_min_primary_server_version")]
    pub min_primary_server_version: String,

    /// Fall back to explicit cross-reference creation when the server
    /// refuses to create one during head commit (optional, default true)
    #[serde(default = "default_true")]
    pub manual_cross_ref_fallback: bool,

    /// Provision new links with cost 100 and a 180 minute interval
    /// (optional, default false)
    #[serde(default)]
    pub recommended_link_defaults: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_min_primary_server_version() -> String {
    "5.2".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "snapshot_path",
                reason: "must not be empty".to_string(),
            });
        }
        self.severity()?;
        self.partition_policy()?;
        Ok(())
    }

    /// Minimum log severity
    pub fn severity(&self) -> ConfigResult<Severity> {
        Severity::parse(&self.log_level).ok_or_else(|| ConfigError::Invalid {
            key: "log_level",
            reason: format!(
                "'{}' is not one of trace, info, warn, error, fatal",
                self.log_level
            ),
        })
    }

    pub fn partition_policy(&self) -> ConfigResult<PartitionPolicy> {
        let min_primary_version = self
            .min_primary_server_version
            .parse::<ServerVersion>()
            .map_err(|e| ConfigError::Invalid {
                key: "min_primary_server_version",
                reason: e.to_string(),
            })?;
        Ok(PartitionPolicy {
            min_primary_version,
            manual_cross_ref_fallback: self.manual_cross_ref_fallback,
        })
    }

    pub fn link_policy(&self) -> LinkPolicy {
        LinkPolicy {
            recommended_defaults: self.recommended_link_defaults,
        }
    }
}

/// Partition commit and membership rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPolicy {
    /// Lowest version a primary server may run to join a replica set
    pub min_primary_version: ServerVersion,
    /// Create the cross-reference explicitly when the server will not
    pub manual_cross_ref_fallback: bool,
}

impl Default for PartitionPolicy {
    fn default() -> Self {
        Self {
            min_primary_version: ServerVersion::new(5, 2),
            manual_cross_ref_fallback: true,
        }
    }
}

/// Site link provisioning rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkPolicy {
    /// Write cost 100 and interval 180 on new links
    pub recommended_defaults: bool,
}

impl LinkPolicy {
    pub const RECOMMENDED_COST: i32 = 100;
    pub const RECOMMENDED_INTERVAL_MINUTES: i64 = 180;
}
