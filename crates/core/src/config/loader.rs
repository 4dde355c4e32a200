//! Configuration file loader for `.enrich-kit/` directory structure.
//!
//! This module provides functionality to load and parse all configuration files
//! from the `.enrich-kit/` directory, including:
//! - `config.toml`: Global settings
//! - `prompts/*.md`: Prompt overrides with YAML front matter

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use ek_protocol::config_models::GlobalConfig;
use ek_protocol::prompt_models::PromptTemplate;
use gray_matter::engine::YAML;
use gray_matter::Matter;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Name of the configuration directory under the project root.
pub const CONFIG_DIR: &str = ".enrich-kit";

/// Loads all configuration from the `.enrich-kit/` directory.
///
/// This function scans the `.enrich-kit/` directory and loads:
/// - Global configuration from `config.toml`
/// - Prompt overrides from `prompts/*.md` files
///
/// # Arguments
///
/// * `root` - Root directory containing the `.enrich-kit/` folder
///
/// # Returns
///
/// An `AppConfig` containing all loaded configuration. If directories or files
/// are missing (but the root exists), returns a default configuration
/// rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid syntax (TOML or Markdown front matter)
/// - Timing values are zero or two prompts target the same step
///
/// # Example
///
/// ```rust,no_run
/// use ek_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Backend at {}", config.global.backend.base_url);
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let ek_dir = root.join(CONFIG_DIR);

    if !ek_dir.exists() {
        debug!(dir = %ek_dir.display(), "no config directory, using defaults");
        return Ok(AppConfig::default());
    }

    let global = load_global_config(&ek_dir)?;
    let prompts = load_prompts(&ek_dir)?;

    Ok(AppConfig { global, prompts })
}

/// Loads global configuration from `config.toml`.
fn load_global_config(ek_dir: &Path) -> ConfigResult<GlobalConfig> {
    let config_path = ek_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    let config: GlobalConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path.clone(),
            source,
        })?;

    let timing = &config.timing;
    if timing.poll_interval_ms == 0 || timing.ticker_interval_ms == 0 {
        return Err(ConfigError::InvalidConfig {
            path: config_path,
            reason: "timing intervals must be greater than zero".to_string(),
        });
    }

    Ok(config)
}

/// Loads all prompt overrides from `prompts/*.md`.
fn load_prompts(ek_dir: &Path) -> ConfigResult<Vec<PromptTemplate>> {
    let prompts_dir = ek_dir.join("prompts");

    if !prompts_dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompts = Vec::new();
    let mut seen_steps = HashSet::new();

    for entry in WalkDir::new(&prompts_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: prompts_dir.clone(),
            source,
        })?;

        let path = entry.path();

        if path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let matter = Matter::<YAML>::new();
        let result = matter.parse(&content);

        let mut prompt: PromptTemplate = result
            .data
            .ok_or_else(|| ConfigError::MarkdownParse {
                path: path.to_path_buf(),
                reason: "Missing YAML front matter".to_string(),
            })?
            .deserialize()
            .map_err(|e| ConfigError::MarkdownParse {
                path: path.to_path_buf(),
                reason: format!("Failed to deserialize front matter: {e}"),
            })?;

        if !seen_steps.insert(prompt.step) {
            return Err(ConfigError::InvalidConfig {
                path: path.to_path_buf(),
                reason: format!("more than one prompt override for step '{}'", prompt.step),
            });
        }

        prompt.body = result.content.trim().to_string();
        prompts.push(prompt);
    }

    Ok(prompts)
}
