//! Push-channel message models.
//!
//! The backend pushes one JSON object per WebSocket frame for each running
//! job. The `type` field discriminates the message; the counters are
//! cumulative for the whole job.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::process_models::ProcessStats;

/// Discriminant of a push-channel message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMessageKind {
    /// Intermediate counters.
    Progress,

    /// The job finished; counters are final.
    Complete,

    /// The job was cancelled server-side.
    Cancelled,

    /// The job failed; `message` carries the reason.
    Error,
}

/// A message received on a process's push channel.
///
/// ```json
/// {"type": "progress", "step": "Build Description", "total": 100,
///  "processed": 12, "success": 10, "errors": 2, "skipped": 40}
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: ChannelMessageKind,

    #[serde(default)]
    pub total: u64,

    #[serde(default)]
    pub success: u64,

    #[serde(default)]
    pub errors: u64,

    #[serde(default)]
    pub skipped: u64,

    #[serde(default)]
    pub processed: u64,

    /// Display name of the step, as echoed by the server.
    #[serde(default)]
    pub step: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

impl ChannelMessage {
    /// A message of the given kind with all counters at zero.
    pub fn new(kind: ChannelMessageKind) -> Self {
        Self {
            kind,
            total: 0,
            success: 0,
            errors: 0,
            skipped: 0,
            processed: 0,
            step: None,
            message: None,
        }
    }

    pub fn progress(total: u64, success: u64, skipped: u64) -> Self {
        Self {
            total,
            success,
            skipped,
            processed: success,
            ..Self::new(ChannelMessageKind::Progress)
        }
    }

    pub fn complete(total: u64, success: u64, errors: u64, skipped: u64) -> Self {
        Self {
            total,
            success,
            errors,
            skipped,
            processed: success,
            ..Self::new(ChannelMessageKind::Complete)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(ChannelMessageKind::Error)
        }
    }

    /// The counters carried by this message, without `initial_empty_rows`.
    pub fn counts(&self) -> ProcessStats {
        ProcessStats {
            total: self.total,
            processed: self.processed,
            success: self.success,
            errors: self.errors,
            skipped: self.skipped,
            ..ProcessStats::default()
        }
    }
}
