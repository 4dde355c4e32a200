//! Global configuration models for `.enrich-kit/config.toml`.
//!
//! This module defines the structure of the configuration file that
//! controls where the backend lives, how the progress tracker times its
//! fallbacks, and where view state is persisted.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// Represents global settings from `.enrich-kit/config.toml`.
///
/// Every section is optional; missing values take their defaults.
///
/// # Example
///
/// ```toml
/// # .enrich-kit/config.toml
/// history_limit = 50
///
/// [backend]
/// base_url = "http://localhost:8000"
/// ws_url = "ws://localhost:8000"
///
/// [timing]
/// grace_period_ms = 5000
/// poll_interval_ms = 500
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct GlobalConfig {
    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub timing: TimingSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    /// Number of entries `enrich history` fetches by default.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            timing: TimingSettings::default(),
            storage: StorageSettings::default(),
            history_limit: default_history_limit(),
        }
    }
}

/// Where the enrichment backend is reachable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct BackendSettings {
    /// Base URL of the HTTP API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the WebSocket endpoint (`/ws/{token}` is appended).
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Upper bound on one job submission. Jobs routinely run for minutes.
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: default_ws_url(),
            submit_timeout_secs: default_submit_timeout_secs(),
        }
    }
}

/// Timers used by the progress tracker.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
pub struct TimingSettings {
    /// Delay after progress reaches 100% before completion is forced.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Interval at which a view reads the other view's registry.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Interval of the per-process elapsed-time ticker.
    #[serde(default = "default_ticker_interval_ms")]
    pub ticker_interval_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            ticker_interval_ms: default_ticker_interval_ms(),
        }
    }
}

/// Where view registries are persisted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct StorageSettings {
    /// Directory, relative to the project root unless absolute.
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:8000".to_string()
}

fn default_submit_timeout_secs() -> u64 {
    60 * 60
}

fn default_grace_period_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_ticker_interval_ms() -> u64 {
    1_000
}

fn default_storage_dir() -> String {
    ".enrich-kit/state".to_string()
}

fn default_history_limit() -> u32 {
    100
}
