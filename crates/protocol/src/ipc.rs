//! Communication protocol between a view front-end and its session core.
//!
//! The protocol follows an Operation/Event pattern:
//! - `Op`: Commands sent from the front-end to the session
//! - `Event`: State changes sent from the session to the front-end
//!
//! Communication is asynchronous and channel-based, so the front-end stays
//! responsive while jobs run for minutes.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::process_models::{Process, StepName};

/// Operations sent from a front-end to its session.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// {
///   "type": "launchJob",
///   "payload": {
///     "sheet_id": "1AbC...",
///     "step": "Build Description",
///     "sheet_name": "Structured Data",
///     "prompt_override": null
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Op {
    /// Launch an enrichment step against a spreadsheet.
    LaunchJob {
        sheet_id: String,
        step: StepName,
        sheet_name: Option<String>,
        prompt_override: Option<String>,
    },

    /// Cancel a running process. Only honored by the view that launched it.
    CancelProcess {
        #[ts(type = "string")]
        process_id: Uuid,
    },

    /// Drop a process from this view's registry.
    RemoveProcess {
        #[ts(type = "string")]
        process_id: Uuid,
    },

    /// Force a stuck process to completed.
    MarkCompleted {
        #[ts(type = "string")]
        process_id: Uuid,
    },

    /// Request the current state of all processes.
    GetDashboardState,

    /// Unmount the view, closing every channel and timer.
    Shutdown,
}

/// Events sent from a session to its front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A process was launched from this view.
    ProcessStarted { process: Process },

    /// A process launched in the other view was picked up here.
    ProcessDiscovered { process: Process },

    /// Counters, progress or elapsed time changed.
    ProcessUpdated { process: Process },

    /// A process reached completion.
    ProcessCompleted { process: Process },

    /// A process was cancelled.
    ProcessCancelled {
        #[ts(type = "string")]
        process_id: Uuid,
    },

    /// A process ended in error.
    ProcessFailed {
        #[ts(type = "string")]
        process_id: Uuid,
        error: String,
    },

    /// A process left this view's registry.
    ProcessRemoved {
        #[ts(type = "string")]
        process_id: Uuid,
    },

    /// Operator-facing message (submission failure, server error, rejected command).
    Notification { message: String },

    /// Reply to `Op::GetDashboardState`.
    DashboardState { processes: Vec<Process> },
}
