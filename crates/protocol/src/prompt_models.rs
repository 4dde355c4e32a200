//! Prompt override models for `.enrich-kit/prompts/*.md`.
//!
//! A prompt override replaces the backend's built-in prompt for one step.
//! Overrides are Markdown files with YAML front matter.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::process_models::StepName;

/// A prompt override for one enrichment step.
///
/// # Example
///
/// ```markdown
/// ---
/// step: Build Description
/// description: Shorter, buyer-facing descriptions
/// ---
///
/// Write a two-sentence technical description of the asset using only
/// the trusted data provided.
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct PromptTemplate {
    /// Step this prompt applies to, by display name.
    pub step: StepName,

    /// Human-readable note about what the override changes.
    #[serde(default)]
    pub description: String,

    /// The Markdown body, which is sent verbatim as the custom prompt.
    #[serde(skip)]
    pub body: String,
}
