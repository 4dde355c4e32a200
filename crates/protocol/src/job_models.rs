//! Job submission and history models.
//!
//! These mirror the backend's request bodies, so they keep the backend's
//! own field names (`sheetId` next to `sheet_name`).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::process_models::{Process, ProcessStats, StepName};
use uuid::Uuid;

/// Body of a job submission.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct JobRequest {
    #[serde(rename = "sheetId")]
    pub sheet_id: String,

    pub step: StepName,

    /// Target tab. The backend auto-detects it when absent.
    #[serde(default)]
    pub sheet_name: Option<String>,

    /// Push-channel token the backend reports progress on.
    pub session_id: String,

    /// Prompt used instead of the backend's default for this step.
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

/// Final counters returned by a completed submission.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
pub struct JobStats {
    pub total: u64,
    pub success: u64,
    pub errors: u64,
    pub skipped: u64,
    pub processed: u64,
}

impl From<&JobStats> for ProcessStats {
    fn from(stats: &JobStats) -> Self {
        ProcessStats {
            total: stats.total,
            processed: stats.processed,
            success: stats.success,
            errors: stats.errors,
            skipped: stats.skipped,
            ..ProcessStats::default()
        }
    }
}

/// Result of a successful submission.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
pub struct JobOutcome {
    pub stats: JobStats,

    /// Sheet row numbers written by the job.
    #[serde(default)]
    pub filled_row_indices: Vec<u32>,
}

/// One line of the durable audit log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct HistoryEntry {
    /// Assigned by the backend; absent on entries not yet stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub sheet_name: String,

    #[serde(default)]
    pub step: Option<String>,

    pub message: String,

    /// RFC 3339 time the outcome was recorded.
    pub timestamp: String,

    /// Elapsed run time, e.g. `2m 05s`.
    pub time: String,
}

/// A process record as the backend keeps it for `/active-processes`.
///
/// The backend lists these to any client, so each view mirrors the records
/// it launched there. Unlike the locally persisted [`Process`], the fields
/// keep the backend's snake_case names.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct SharedProcessRecord {
    #[ts(type = "string")]
    pub process_id: Uuid,
    pub step_name: StepName,
    pub sheet_name: String,

    /// The process's channel token.
    pub session_id: String,

    #[serde(default)]
    pub stats: ProcessStats,

    /// Seconds since launch.
    #[serde(default)]
    pub elapsed_time: u64,

    #[serde(default)]
    pub is_completed: bool,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub progress: f64,

    /// Launch time in milliseconds since the Unix epoch.
    #[ts(type = "number")]
    pub start_time: i64,
}

impl From<&Process> for SharedProcessRecord {
    fn from(process: &Process) -> Self {
        SharedProcessRecord {
            process_id: process.id,
            step_name: process.step_name,
            sheet_name: process.sheet_name.clone(),
            session_id: process.channel_token.clone(),
            stats: process.stats.clone(),
            elapsed_time: process.elapsed_time,
            is_completed: process.is_completed,
            is_active: process.is_active,
            progress: process.progress,
            start_time: process.start_time.timestamp_millis(),
        }
    }
}
