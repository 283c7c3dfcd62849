//! Configuration loading with precedence handling.
//!
//! Precedence, lowest to highest: built-in defaults, TOML config file,
//! environment variables, CLI flags. Missing config files are not errors.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// Errors while loading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to read an existing config file.
    #[error("failed to read config file at {path}: {reason}")]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Config file contains invalid TOML.
    #[error("invalid TOML in {path}: {reason}")]
    ParseError {
        /// Path with invalid TOML.
        path: PathBuf,
        /// Parse error details.
        reason: String,
    },
}

/// TOML configuration file structure (`~/.config/tidechat/config.toml`).
///
/// Every field is optional; unset fields fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// REST base URL.
    #[serde(default)]
    pub server_url: Option<String>,

    /// WebSocket channel URL.
    #[serde(default)]
    pub channel_url: Option<String>,

    /// Messages fetched per hydration page.
    #[serde(default)]
    pub page_size: Option<u32>,

    /// Messages in one day before hour sub-bands split it.
    #[serde(default)]
    pub hour_band_threshold: Option<usize>,

    /// Rows from the bottom still counting as "at bottom".
    #[serde(default)]
    pub bottom_proximity_rows: Option<usize>,

    /// Milliseconds a scroll restore waits for its anchor.
    #[serde(default)]
    pub anchor_deadline_ms: Option<u64>,

    /// Reconnect backoff base delay, milliseconds.
    #[serde(default)]
    pub reconnect_base_ms: Option<u64>,

    /// Reconnect backoff cap, milliseconds.
    #[serde(default)]
    pub reconnect_max_ms: Option<u64>,

    /// Consecutive reconnect failures tolerated before giving up.
    #[serde(default)]
    pub reconnect_max_attempts: Option<u32>,

    /// Assumed height of unmeasured rows.
    #[serde(default)]
    pub estimate_rows: Option<u16>,

    /// Path for tracing output.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
}

/// Fully resolved configuration after precedence merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// REST base URL.
    pub server_url: String,
    /// WebSocket channel URL.
    pub channel_url: String,
    /// Messages fetched per hydration page.
    pub page_size: u32,
    /// Messages in one day before hour sub-bands split it.
    pub hour_band_threshold: usize,
    /// Rows from the bottom still counting as "at bottom".
    pub bottom_proximity_rows: usize,
    /// Milliseconds a scroll restore waits for its anchor.
    pub anchor_deadline_ms: u64,
    /// Reconnect backoff base delay, milliseconds.
    pub reconnect_base_ms: u64,
    /// Reconnect backoff cap, milliseconds.
    pub reconnect_max_ms: u64,
    /// Consecutive reconnect failures tolerated before giving up.
    pub reconnect_max_attempts: u32,
    /// Assumed height of unmeasured rows.
    pub estimate_rows: u16,
    /// Path for tracing output.
    pub log_file_path: PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:4000".to_string(),
            channel_url: "ws://localhost:4000/ws".to_string(),
            page_size: 50,
            hour_band_threshold: crate::timeline::HOUR_BAND_DAY_THRESHOLD,
            bottom_proximity_rows: crate::view_state::BOTTOM_PROXIMITY_ROWS,
            anchor_deadline_ms: crate::view_state::ANCHOR_RESTORE_DEADLINE.as_millis() as u64,
            reconnect_base_ms: 500,
            reconnect_max_ms: 30_000,
            reconnect_max_attempts: 8,
            estimate_rows: crate::view_state::DEFAULT_ESTIMATE_ROWS,
            log_file_path: default_log_path(),
        }
    }
}

/// Default log path: platform state dir, falling back to the cwd.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        state_dir.join("tidechat").join("tidechat.log")
    } else {
        PathBuf::from("tidechat.log")
    }
}

/// Default config file path, `None` when the platform config dir is unknown.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tidechat").join("config.toml"))
}

/// Load one config file. A missing file is `Ok(None)`, not an error.
pub fn load_config_file(path: impl Into<PathBuf>) -> Result<Option<ConfigFile>, ConfigError> {
    let path = path.into();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let config: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(Some(config))
}

/// Locate and load the config file.
///
/// Precedence: explicit `--config` path, then `TIDECHAT_CONFIG`, then the
/// platform default path.
pub fn load_config_with_precedence(
    config_path: Option<PathBuf>,
) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = config_path {
        return load_config_file(path);
    }
    if let Ok(env_path) = std::env::var("TIDECHAT_CONFIG") {
        return load_config_file(PathBuf::from(env_path));
    }
    if let Some(default_path) = default_config_path() {
        return load_config_file(default_path);
    }
    Ok(None)
}

/// Merge a loaded file over the defaults.
pub fn merge_config(config_file: Option<ConfigFile>) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();
    let Some(config) = config_file else {
        return defaults;
    };
    ResolvedConfig {
        server_url: config.server_url.unwrap_or(defaults.server_url),
        channel_url: config.channel_url.unwrap_or(defaults.channel_url),
        page_size: config.page_size.unwrap_or(defaults.page_size),
        hour_band_threshold: config
            .hour_band_threshold
            .unwrap_or(defaults.hour_band_threshold),
        bottom_proximity_rows: config
            .bottom_proximity_rows
            .unwrap_or(defaults.bottom_proximity_rows),
        anchor_deadline_ms: config.anchor_deadline_ms.unwrap_or(defaults.anchor_deadline_ms),
        reconnect_base_ms: config.reconnect_base_ms.unwrap_or(defaults.reconnect_base_ms),
        reconnect_max_ms: config.reconnect_max_ms.unwrap_or(defaults.reconnect_max_ms),
        reconnect_max_attempts: config
            .reconnect_max_attempts
            .unwrap_or(defaults.reconnect_max_attempts),
        estimate_rows: config.estimate_rows.unwrap_or(defaults.estimate_rows),
        log_file_path: config.log_file_path.unwrap_or(defaults.log_file_path),
    }
}

/// Apply environment overrides (`TIDECHAT_SERVER_URL`, `TIDECHAT_CHANNEL_URL`).
pub fn apply_env_overrides(mut config: ResolvedConfig) -> ResolvedConfig {
    if let Ok(url) = std::env::var("TIDECHAT_SERVER_URL") {
        config.server_url = url;
    }
    if let Ok(url) = std::env::var("TIDECHAT_CHANNEL_URL") {
        config.channel_url = url;
    }
    config
}

/// Apply CLI overrides; CLI flags have the highest precedence.
pub fn apply_cli_overrides(
    mut config: ResolvedConfig,
    server_url: Option<String>,
    channel_url: Option<String>,
    log_file: Option<PathBuf>,
) -> ResolvedConfig {
    if let Some(url) = server_url {
        config.server_url = url;
    }
    if let Some(url) = channel_url {
        config.channel_url = url;
    }
    if let Some(path) = log_file {
        config.log_file_path = path;
    }
    config
}

// ===== Tests =====
