//! Server configuration for the ALFWorld session gateway
//!
//! Configuration is assembled from CLI flags with sensible defaults. The
//! `data_volume` flag uses Docker's `host:container:mode` syntax; the host
//! component supports `~` expansion so the default of `~/.cache/alfworld`
//! works from any shell.

use crate::cli::commands::ServeArgs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default values for configuration
pub const DEFAULT_DOCKER_IMAGE: &str = "alfworld-text:latest";
pub const DEFAULT_DATA_VOLUME: &str = "~/.cache/alfworld:/data:ro";
const DEFAULT_CONTAINER_DATA_PATH: &str = "/data";
const DEFAULT_VOLUME_MODE: &str = "ro";
const MAX_BATCH_WINDOW_MS: u64 = 10_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The ALFWorld base config YAML was not found
    #[error("Config file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    /// max-sessions must allow at least one session
    #[error("--max-sessions must be at least 1 (got {0})")]
    InvalidMaxSessions(usize),

    /// batch-window-ms outside the supported range
    #[error("--batch-window-ms must be at most {MAX_BATCH_WINDOW_MS} (got {0})")]
    InvalidBatchWindow(u64),

    /// data-volume is missing the container component
    #[error("--data-volume must be HOST:CONTAINER[:MODE] (got {0:?})")]
    InvalidDataVolume(String),
}

/// Runtime configuration for the gateway server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the ALFWorld base config YAML (game discovery reads this)
    pub alfworld_config_path: PathBuf,

    /// Docker image used for worker containers
    pub docker_image: String,

    /// Volume mount for game data, `host:container:mode` with `~` expanded
    pub data_volume: String,

    /// Maximum number of concurrent sessions (container pool bound)
    pub max_sessions: usize,

    /// Step-request coalescing window; 0 disables coalescing
    pub batch_window_ms: u64,

    /// Sessions idle longer than this are evicted, in seconds
    pub idle_timeout_s: u64,

    /// Host to bind the HTTP listener to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl ServerConfig {
    /// Builds and validates a configuration from the `serve` CLI arguments.
    pub fn from_args(args: &ServeArgs) -> Result<Self, ConfigError> {
        let config = Self {
            alfworld_config_path: args.config.clone(),
            docker_image: args.docker_image.clone(),
            data_volume: expand_tilde_volume(&args.data_volume),
            max_sessions: args.max_sessions,
            batch_window_ms: args.batch_window_ms,
            idle_timeout_s: args.idle_timeout,
            host: args.host.clone(),
            port: args.port,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates field values and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.alfworld_config_path.exists() {
            return Err(ConfigError::ConfigFileNotFound(
                self.alfworld_config_path.clone(),
            ));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidMaxSessions(self.max_sessions));
        }
        if self.batch_window_ms > MAX_BATCH_WINDOW_MS {
            return Err(ConfigError::InvalidBatchWindow(self.batch_window_ms));
        }
        if self.data_volume.split(':').count() < 2 {
            return Err(ConfigError::InvalidDataVolume(self.data_volume.clone()));
        }
        Ok(())
    }

    /// Host side of the data volume mount.
    pub fn data_host_path(&self) -> &str {
        self.data_volume.split(':').next().unwrap_or("")
    }

    /// Container side of the data volume mount.
    pub fn data_container_path(&self) -> &str {
        self.data_volume
            .split(':')
            .nth(1)
            .unwrap_or(DEFAULT_CONTAINER_DATA_PATH)
    }

    /// Mount mode of the data volume (`ro` unless specified).
    pub fn data_volume_mode(&self) -> &str {
        self.data_volume
            .split(':')
            .nth(2)
            .unwrap_or(DEFAULT_VOLUME_MODE)
    }

    /// Translates a host data path to the corresponding path inside a worker
    /// container. Paths outside the data mount are passed through unchanged.
    pub fn to_container_path(&self, host_path: &str) -> String {
        let host_data = self.data_host_path();
        match host_path.strip_prefix(host_data) {
            Some(rest) if !host_data.is_empty() => {
                format!("{}{}", self.data_container_path(), rest)
            }
            _ => host_path.to_string(),
        }
    }
}

/// Expands a leading `~` in the host component of a `host:container:mode`
/// volume spec.
fn expand_tilde_volume(volume: &str) -> String {
    let mut parts: Vec<String> = volume.split(':').map(str::to_string).collect();
    if let Some(host) = parts.first_mut() {
        *host = expand_tilde(host);
    }
    parts.join(":")
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~") {
        if rest.is_empty() || rest.starts_with('/') {
            if let Some(home) = dirs::home_dir() {
                return format!("{}{}", home.display(), rest);
            }
        }
    }
    path.to_string()
}

/// Resolves the local game data directory: `$ALFWORLD_DATA` when set,
/// `$HOME/.cache/alfworld` otherwise.
pub fn resolve_data_dir() -> PathBuf {
    match std::env::var_os("ALFWORLD_DATA") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cache")
            .join("alfworld"),
    }
}

/// True when the path does not exist or contains no entries.
pub fn dir_is_empty(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
