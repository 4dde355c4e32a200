//! Runtime process state models.
//!
//! This module defines the record each view keeps for one enrichment job
//! run against one spreadsheet, together with the fixed step catalogue and
//! the derived progress formula inputs.
//!
//! These records are persisted as JSON under each view's storage key, so
//! field names serialize in camelCase to match the browser front-end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

/// One of the fixed enrichment operations the backend can run over a sheet.
///
/// Serialized by the display name the backend expects in its `step` field.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
pub enum StepName {
    #[serde(rename = "Generate AI Data")]
    GenerateAiData,

    #[serde(rename = "Build Description")]
    BuildDescription,

    #[serde(rename = "AI Source Comparables")]
    AiSourceComparables,

    #[serde(rename = "Extract price from AI Comparable")]
    ExtractPrice,

    #[serde(rename = "AI Similar Comparable")]
    AiSimilarComparable,
}

/// What "total work" means for a step when deriving a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressBasis {
    /// Every row counts; rows finished or skipped advance progress.
    ProcessedRows,

    /// Only rows that were empty when the job started count.
    EmptyRows,
}

impl StepName {
    /// All steps, in the order the operator normally runs them.
    pub const ALL: [StepName; 5] = [
        StepName::GenerateAiData,
        StepName::BuildDescription,
        StepName::AiSourceComparables,
        StepName::ExtractPrice,
        StepName::AiSimilarComparable,
    ];

    /// Display name, identical to the backend's `step` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::GenerateAiData => "Generate AI Data",
            StepName::BuildDescription => "Build Description",
            StepName::AiSourceComparables => "AI Source Comparables",
            StepName::ExtractPrice => "Extract price from AI Comparable",
            StepName::AiSimilarComparable => "AI Similar Comparable",
        }
    }

    /// Short command-line name.
    pub fn slug(&self) -> &'static str {
        match self {
            StepName::GenerateAiData => "ai-data",
            StepName::BuildDescription => "description",
            StepName::AiSourceComparables => "comparables",
            StepName::ExtractPrice => "extract-price",
            StepName::AiSimilarComparable => "similar",
        }
    }

    /// The progress formula this step uses.
    ///
    /// `Build Description` reports rows that already hold a description as
    /// `skipped`, so its unit of work is the rows left empty.
    pub fn progress_basis(&self) -> ProgressBasis {
        match self {
            StepName::BuildDescription => ProgressBasis::EmptyRows,
            _ => ProgressBasis::ProcessedRows,
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStep(pub String);

impl fmt::Display for UnknownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown step '{}'", self.0)
    }
}

impl std::error::Error for UnknownStep {}

impl FromStr for StepName {
    type Err = UnknownStep;

    /// Accepts either the slug or the display name (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        StepName::ALL
            .into_iter()
            .find(|step| {
                step.slug().eq_ignore_ascii_case(wanted) || step.as_str().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| UnknownStep(wanted.to_string()))
    }
}

/// Which of the two views a record or storage key belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "lowercase")]
pub enum ViewRole {
    /// The view where jobs are normally launched.
    Home,

    /// The view that follows jobs launched elsewhere.
    Monitor,
}

impl ViewRole {
    /// The other view.
    pub fn peer(&self) -> ViewRole {
        match self {
            ViewRole::Home => ViewRole::Monitor,
            ViewRole::Monitor => ViewRole::Home,
        }
    }

    /// Durable key holding this view's full process registry.
    pub fn registry_key(&self) -> &'static str {
        match self {
            ViewRole::Home => "home.processes",
            ViewRole::Monitor => "monitor.processes",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewRole::Home => "home",
            ViewRole::Monitor => "monitor",
        }
    }
}

impl fmt::Display for ViewRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared key used as the mailbox for "a new process was started elsewhere".
pub const DISCOVERY_KEY: &str = "discovery.new_process";

/// Row counters for a process, as last reported.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    #[serde(default)]
    pub total: u64,

    #[serde(default)]
    pub processed: u64,

    #[serde(default)]
    pub success: u64,

    #[serde(default)]
    pub errors: u64,

    #[serde(default)]
    pub skipped: u64,

    /// Rows that needed a value when the job started.
    ///
    /// `None` until known. A value supplied at launch is an estimate until
    /// `empty_rows_reported` is set.
    #[serde(default)]
    pub initial_empty_rows: Option<u64>,

    /// Whether `initial_empty_rows` was derived from a server report.
    #[serde(default)]
    pub empty_rows_reported: bool,
}

/// Display status derived from a process's lifecycle flags.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    /// The job is still being tracked.
    Running,

    /// The job finished, either by a terminal message or by reconciliation.
    Completed,

    /// The job was cancelled.
    Cancelled,

    /// The server reported an error or the submission failed.
    Failed,
}

/// One enrichment job run against one spreadsheet, tracked end to end.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    /// Unique identifier, generated by the view that launched the job.
    #[ts(type = "string")]
    pub id: Uuid,

    pub step_name: StepName,

    /// Display name of the target tab. Informational only.
    #[serde(default)]
    pub sheet_name: String,

    /// Correlates this process with its push-channel subscription.
    pub channel_token: String,

    #[serde(default)]
    pub stats: ProcessStats,

    /// Derived percentage in `[0, 100]`.
    #[serde(default)]
    pub progress: f64,

    /// Seconds since `start_time`.
    #[serde(default)]
    pub elapsed_time: u64,

    #[ts(type = "string")]
    pub start_time: DateTime<Utc>,

    pub is_active: bool,

    #[serde(default)]
    pub is_completed: bool,

    #[serde(default)]
    pub is_cancelled: bool,

    /// Failure message for a process that ended in error.
    #[serde(default)]
    pub error: Option<String>,

    /// Latched once the terminal outcome has been written to history.
    #[serde(default)]
    pub history_saved: bool,

    /// The view that launched the job.
    pub origin: ViewRole,

    /// Sheet rows the job wrote, as returned by the submission.
    #[serde(default)]
    pub filled_row_indices: Vec<u32>,
}

impl Process {
    /// True once the process has reached any terminal state.
    pub fn is_terminal(&self) -> bool {
        !self.is_active
    }

    pub fn status(&self) -> ProcessStatus {
        if self.is_completed {
            ProcessStatus::Completed
        } else if self.is_cancelled {
            ProcessStatus::Cancelled
        } else if self.is_active {
            ProcessStatus::Running
        } else {
            ProcessStatus::Failed
        }
    }
}

/// Mailbox payload announcing a newly launched process to the other view.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryNotice {
    #[ts(type = "string")]
    pub process_id: Uuid,
    pub step_name: StepName,
    pub channel_token: String,
    pub stats: ProcessStats,
    pub sheet_name: String,
    pub origin: ViewRole,
    #[ts(type = "string")]
    pub start_time: DateTime<Utc>,
}

impl From<&Process> for DiscoveryNotice {
    fn from(process: &Process) -> Self {
        Self {
            process_id: process.id,
            step_name: process.step_name,
            channel_token: process.channel_token.clone(),
            stats: process.stats.clone(),
            sheet_name: process.sheet_name.clone(),
            origin: process.origin,
            start_time: process.start_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_from_slug_and_display_name() {
        assert_eq!("description".parse::<StepName>(), Ok(StepName::BuildDescription));
        assert_eq!("build description".parse::<StepName>(), Ok(StepName::BuildDescription));
        assert_eq!(
            "Extract price from AI Comparable".parse::<StepName>(),
            Ok(StepName::ExtractPrice)
        );
        assert!("translate".parse::<StepName>().is_err());
    }

    #[test]
    fn test_only_build_description_counts_empty_rows() {
        for step in StepName::ALL {
            let expected = if step == StepName::BuildDescription {
                ProgressBasis::EmptyRows
            } else {
                ProgressBasis::ProcessedRows
            };
            assert_eq!(step.progress_basis(), expected, "{step}");
        }
    }

    #[test]
    fn test_view_roles_use_distinct_keys() {
        assert_eq!(ViewRole::Home.peer(), ViewRole::Monitor);
        assert_eq!(ViewRole::Monitor.peer(), ViewRole::Home);
        assert_ne!(ViewRole::Home.registry_key(), ViewRole::Monitor.registry_key());
        assert_ne!(ViewRole::Home.registry_key(), DISCOVERY_KEY);
    }
}
