//! Runtime configuration shared by the Coordinator and Worker binaries.
//!
//! Loaded from an optional JSON or YAML file (sniffed by extension) and then
//! overridden field-by-field from environment variables, so containerized
//! deployments don't need a file at all.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// How often a Worker sends a heartbeat to the Coordinator.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// How long since a Worker's last heartbeat before the failure detector
    /// marks it dead.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    /// Period of the failure detector's sweep.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Period of the scheduler's drainer, which retries unassigned blocks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Port the Coordinator's control server listens on.
    #[serde(default = "default_coordinator_port")]
    pub coordinator_port: u16,
    /// Port a Worker listens on for pushed tasks.
    #[serde(default = "default_task_listen_port")]
    pub task_listen_port: u16,
    /// Base URL of the external artifact service.
    #[serde(default = "default_artifact_service_url")]
    pub artifact_service_url: String,
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

fn default_heartbeat_timeout_secs() -> u64 {
    15
}

fn default_monitor_interval_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_coordinator_port() -> u16 {
    9000
}

fn default_task_listen_port() -> u16 {
    9100
}

fn default_artifact_service_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            coordinator_port: default_coordinator_port(),
            task_listen_port: default_task_listen_port(),
            artifact_service_url: default_artifact_service_url(),
        }
    }
}

impl Config {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Apply `BLOCKCTL_*` environment variable overrides on top of whatever
    /// was loaded from a file (or the defaults).
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(v) = env_u64("BLOCKCTL_HEARTBEAT_INTERVAL_SECS") {
            self.heartbeat_interval_secs = v;
        }
        if let Some(v) = env_u64("BLOCKCTL_HEARTBEAT_TIMEOUT_SECS") {
            self.heartbeat_timeout_secs = v;
        }
        if let Some(v) = env_u64("BLOCKCTL_MONITOR_INTERVAL_SECS") {
            self.monitor_interval_secs = v;
        }
        if let Some(v) = env_u64("BLOCKCTL_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v;
        }
        if let Some(v) = env_u16("BLOCKCTL_COORDINATOR_PORT") {
            self.coordinator_port = v;
        }
        if let Some(v) = env_u16("BLOCKCTL_TASK_LISTEN_PORT") {
            self.task_listen_port = v;
        }
        if let Ok(v) = std::env::var("BLOCKCTL_ARTIFACT_SERVICE_URL") {
            self.artifact_service_url = v;
        }
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Errors loading a config file.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: String, reason: String },
    Parse { path: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, reason } => {
                write!(f, "failed to read config file {path}: {reason}")
            }
            ConfigError::Parse { path, reason } => {
                write!(f, "failed to parse config file {path}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Loads a `Config` from a JSON or YAML file, sniffing the format from the
/// file extension and falling back to JSON-then-YAML when the extension is
/// absent or unrecognized.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let extension = path.extension().and_then(|e| e.to_str());
        match extension {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
            Some("json") => serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
            _ => serde_json::from_str(&contents)
                .or_else(|_| serde_yaml::from_str(&contents))
                .map_err(|e| ConfigError::Parse {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Loads from `path` if given, otherwise returns the defaults; env
    /// overrides are applied in either case.
    pub fn load(path: Option<impl AsRef<Path>>) -> Result<Config, ConfigError> {
        let config = match path {
            Some(p) => Self::from_path(p)?,
            None => Config::default(),
        };
        Ok(config.apply_env_overrides())
    }
}
