//! Configuration models that aggregate all settings.
//!
//! This module provides the unified `AppConfig` structure that combines
//! global settings and prompt overrides into a single configuration object,
//! plus the resolved settings a view session runs with.

use ek_protocol::config_models::{GlobalConfig, TimingSettings};
use ek_protocol::process_models::StepName;
use ek_protocol::prompt_models::PromptTemplate;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Unified application configuration loaded from `.enrich-kit/` directory.
///
/// This structure aggregates all configuration sources:
/// - `config.toml`: Global settings
/// - `prompts/*.md`: Prompt overrides
///
/// # Example
///
/// ```rust,no_run
/// use ek_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} prompt overrides", config.prompts.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Global settings from `config.toml`.
    pub global: GlobalConfig,

    /// All prompt overrides loaded from `prompts/*.md`.
    pub prompts: Vec<PromptTemplate>,
}

impl AppConfig {
    /// The prompt override configured for a step, if any.
    pub fn prompt_for(&self, step: StepName) -> Option<&str> {
        self.prompts
            .iter()
            .find(|prompt| prompt.step == step)
            .map(|prompt| prompt.body.as_str())
    }

    /// Directory holding the persisted view registries.
    pub fn storage_dir(&self, root: &Path) -> PathBuf {
        let dir = Path::new(&self.global.storage.dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            root.join(dir)
        }
    }

    /// Settings a view session runs with.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings::from_timing(&self.global.timing).with_prompts(self.prompts.clone())
    }
}

/// Timers and prompt overrides used by a mounted view session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Delay after progress reaches 100% before completion is forced.
    pub grace_period: Duration,

    /// Interval at which the peer view's registry is read.
    pub poll_interval: Duration,

    /// Interval of the per-process elapsed-time ticker.
    pub ticker_interval: Duration,

    /// Prompt overrides applied when a launch carries none.
    pub prompts: Vec<PromptTemplate>,
}

impl SessionSettings {
    pub fn from_timing(timing: &TimingSettings) -> Self {
        Self {
            grace_period: Duration::from_millis(timing.grace_period_ms),
            poll_interval: Duration::from_millis(timing.poll_interval_ms),
            ticker_interval: Duration::from_millis(timing.ticker_interval_ms),
            prompts: Vec::new(),
        }
    }

    pub fn with_prompts(mut self, prompts: Vec<PromptTemplate>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn prompt_for(&self, step: StepName) -> Option<&str> {
        self.prompts
            .iter()
            .find(|prompt| prompt.step == step)
            .map(|prompt| prompt.body.as_str())
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_timing(&TimingSettings::default())
    }
}
