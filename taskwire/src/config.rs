//! Configuration system for the Taskwire client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskwire/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::BackoffPolicy;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    net: NetFileConfig,
    reconnect: ReconnectFileConfig,
}

/// `[net]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetFileConfig {
    server_url: Option<String>,
    connect_timeout_secs: Option<u64>,
}

/// `[reconnect]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconnectFileConfig {
    base_delay_ms: Option<u64>,
    growth: Option<f64>,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the task board server (http/https or ws/wss).
    pub server_url: Option<String>,
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
    /// Reconnect backoff policy.
    pub reconnect: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            connect_timeout: Duration::from_secs(10),
            reconnect: BackoffPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/taskwire/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read or
    /// parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let backoff_defaults = BackoffPolicy::default();

        Self {
            server_url: cli
                .server_url
                .clone()
                .or_else(|| file.net.server_url.clone()),
            connect_timeout: file
                .net
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            reconnect: BackoffPolicy {
                base: file
                    .reconnect
                    .base_delay_ms
                    .map_or(backoff_defaults.base, Duration::from_millis),
                growth: file.reconnect.growth.unwrap_or(backoff_defaults.growth),
                cap: file
                    .reconnect
                    .max_delay_ms
                    .map_or(backoff_defaults.cap, Duration::from_millis),
                max_attempts: file
                    .reconnect
                    .max_attempts
                    .unwrap_or(backoff_defaults.max_attempts),
            },
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time task board sync client")]
pub struct CliArgs {
    /// Base URL of the task board server.
    #[arg(long, env = "TASKWIRE_SERVER")]
    pub server_url: Option<String>,

    /// Path to config file (default: `~/.config/taskwire/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKWIRE_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskwire").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
