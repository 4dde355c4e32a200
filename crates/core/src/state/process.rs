//! Process state machine implementation.
//!
//! This module provides the transitions a Process record goes through:
//! creation, progress merges, terminal transitions and adoption of a
//! terminal state observed in the peer view. The functions are pure; the
//! session actor decides when to call them and which events to emit.

use chrono::{DateTime, Utc};
use ek_protocol::ipc::Event;
use ek_protocol::job_models::HistoryEntry;
use ek_protocol::process_models::{
    DiscoveryNotice, Process, ProcessStats, ProcessStatus, ProgressBasis, StepName, ViewRole,
};
use uuid::Uuid;

/// Terminal states a process can be driven into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Completed,
    Cancelled,
    Failed(String),
}

/// Result of merging a progress message into a process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressUpdate {
    /// The process is terminal; nothing changed.
    Ignored,
    /// Stats and progress were updated.
    Applied { progress: f64, reached_full: bool },
}

/// Generates a fresh push-channel token.
pub fn new_channel_token() -> String {
    format!("session_{}", Uuid::new_v4().simple())
}

/// Create a new active Process.
///
/// # Arguments
///
/// * `origin` - The view launching the job
/// * `step_name` - The enrichment step to run
/// * `sheet_name` - Display name of the target sheet
/// * `initial_stats` - Counts known before the first channel message
///
/// # Returns
///
/// A new Process with a unique id and channel token, `progress == 0`.
pub fn create_process(
    origin: ViewRole,
    step_name: StepName,
    sheet_name: String,
    initial_stats: ProcessStats,
) -> Process {
    Process {
        id: Uuid::new_v4(),
        step_name,
        sheet_name,
        channel_token: new_channel_token(),
        stats: initial_stats,
        progress: 0.0,
        elapsed_time: 0,
        start_time: Utc::now(),
        is_active: true,
        is_completed: false,
        is_cancelled: false,
        error: None,
        history_saved: false,
        origin,
        filled_row_indices: Vec::new(),
    }
}

/// Builds the local record for a process announced in the discovery mailbox.
pub fn process_from_notice(notice: &DiscoveryNotice, now: DateTime<Utc>) -> Process {
    Process {
        id: notice.process_id,
        step_name: notice.step_name,
        sheet_name: notice.sheet_name.clone(),
        channel_token: notice.channel_token.clone(),
        stats: notice.stats.clone(),
        progress: compute_progress(notice.step_name, &notice.stats),
        elapsed_time: elapsed_secs(notice.start_time, now),
        start_time: notice.start_time,
        is_active: true,
        is_completed: false,
        is_cancelled: false,
        error: None,
        history_saved: false,
        origin: notice.origin,
        filled_row_indices: Vec::new(),
    }
}

/// Step-dependent progress percentage in `[0, 100]`.
///
/// The row-filling step measures against the rows that were empty when the
/// job started, once that count is known. A zero denominator yields 0.
pub fn compute_progress(step: StepName, stats: &ProcessStats) -> f64 {
    let (done, denominator) = match (step.progress_basis(), stats.initial_empty_rows) {
        (ProgressBasis::EmptyRows, Some(empty_rows)) => (stats.success, empty_rows),
        _ => (stats.success.saturating_add(stats.skipped), stats.total),
    };

    if denominator == 0 {
        return 0.0;
    }

    (100.0 * done as f64 / denominator as f64).clamp(0.0, 100.0)
}

/// Replaces stored counts with the reported ones.
///
/// A report without a total keeps the known total; `initial_empty_rows` is
/// never touched here.
pub fn merge_counts(stats: &mut ProcessStats, reported: &ProcessStats) {
    if reported.total > 0 {
        stats.total = reported.total;
    }
    stats.processed = reported.processed;
    stats.success = reported.success;
    stats.errors = reported.errors;
    stats.skipped = reported.skipped;
}

/// Derives `initial_empty_rows` from server counts.
///
/// The first server report with a total replaces whatever was known before,
/// including an estimate supplied at launch. After that the value is derived
/// again only while it still rests on a report without skipped rows, which
/// is the server's early over-estimate; once derived from a nonzero skipped
/// count it stays fixed.
fn update_initial_empty_rows(stats: &mut ProcessStats, previous_skipped: u64) {
    if stats.total == 0 {
        return;
    }

    let rederive = !stats.empty_rows_reported
        || stats.initial_empty_rows.is_none()
        || (previous_skipped == 0 && stats.skipped != previous_skipped);

    if rederive {
        stats.initial_empty_rows = Some(stats.total.saturating_sub(stats.skipped));
        stats.empty_rows_reported = true;
    }
}

/// Merge a progress report into an active process.
///
/// Progress never decreases while the process is active and never exceeds
/// 100. Reaching 100 does not complete the process.
pub fn apply_progress(process: &mut Process, reported: &ProcessStats) -> ProgressUpdate {
    if !process.is_active {
        return ProgressUpdate::Ignored;
    }

    let previous_skipped = process.stats.skipped;
    merge_counts(&mut process.stats, reported);
    update_initial_empty_rows(&mut process.stats, previous_skipped);

    let computed = compute_progress(process.step_name, &process.stats);
    process.progress = process.progress.max(computed);

    ProgressUpdate::Applied {
        progress: process.progress,
        reached_full: process.progress >= 100.0,
    }
}

/// Drive an active process into a terminal state.
///
/// # Arguments
///
/// * `process` - The process to finish
/// * `terminal` - Which terminal state to enter
/// * `final_stats` - Counts carried by the terminal signal, if any
/// * `now` - Time used for the final elapsed value
///
/// # Returns
///
/// `false` when the process was already terminal; the record is then left
/// untouched, so repeated terminal signals are no-ops.
pub fn apply_terminal(
    process: &mut Process,
    terminal: Terminal,
    final_stats: Option<&ProcessStats>,
    now: DateTime<Utc>,
) -> bool {
    if !process.is_active {
        return false;
    }

    if let Some(stats) = final_stats {
        let previous_skipped = process.stats.skipped;
        merge_counts(&mut process.stats, stats);
        update_initial_empty_rows(&mut process.stats, previous_skipped);
    }

    process.is_active = false;
    process.elapsed_time = elapsed_secs(process.start_time, now);

    match terminal {
        Terminal::Completed => {
            process.is_completed = true;
            process.progress = 100.0;
        }
        Terminal::Cancelled => process.is_cancelled = true,
        Terminal::Failed(message) => process.error = Some(message),
    }

    true
}

/// Copy a terminal state observed in the peer view onto the local record.
///
/// Only applies when the local record is still active and the peer's is
/// terminal. Stats, elapsed time and progress are taken verbatim.
pub fn adopt_terminal(local: &mut Process, peer: &Process) -> bool {
    if !local.is_active || peer.is_active {
        return false;
    }

    local.stats = peer.stats.clone();
    local.elapsed_time = peer.elapsed_time;
    local.progress = peer.progress;
    local.is_active = false;
    local.is_completed = peer.is_completed;
    local.is_cancelled = peer.is_cancelled;
    local.error = peer.error.clone();
    local.history_saved = local.history_saved || peer.history_saved;
    if local.filled_row_indices.is_empty() {
        local.filled_row_indices = peer.filled_row_indices.clone();
    }

    true
}

/// Advance the elapsed-time counter of an active process.
pub fn tick(process: &mut Process, now: DateTime<Utc>) -> bool {
    if !process.is_active {
        return false;
    }
    let elapsed = elapsed_secs(process.start_time, now);
    let changed = elapsed != process.elapsed_time;
    process.elapsed_time = elapsed;
    changed
}

/// Whole seconds between `start` and `now`, zero if the clock went back.
pub fn elapsed_secs(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - start).num_seconds()).unwrap_or(0)
}

/// Formats seconds as `Xm YYs`.
pub fn format_elapsed(secs: u64) -> String {
    format!("{}m {:02}s", secs / 60, secs % 60)
}

/// Operator-facing outcome line for a terminal process.
pub fn history_message(process: &Process) -> Option<String> {
    let step = process.step_name;
    match process.status() {
        ProcessStatus::Running => None,
        ProcessStatus::Completed => Some(format!(
            "{step} completed: {} succeeded, {} errors, {} skipped",
            process.stats.success, process.stats.errors, process.stats.skipped
        )),
        ProcessStatus::Cancelled => Some(format!("{step} cancelled")),
        ProcessStatus::Failed => Some(format!(
            "{step} failed: {}",
            process.error.as_deref().unwrap_or("unknown error")
        )),
    }
}

/// History record for a terminal process.
pub fn history_entry(process: &Process, now: DateTime<Utc>) -> Option<HistoryEntry> {
    let message = history_message(process)?;
    Some(HistoryEntry {
        id: None,
        sheet_name: process.sheet_name.clone(),
        step: Some(process.step_name.to_string()),
        message,
        timestamp: now.to_rfc3339(),
        time: format_elapsed(process.elapsed_time),
    })
}

/// Event announcing that `process` reached its current terminal state.
pub fn terminal_event(process: &Process) -> Option<Event> {
    match process.status() {
        ProcessStatus::Running => None,
        ProcessStatus::Completed => Some(Event::ProcessCompleted {
            process: process.clone(),
        }),
        ProcessStatus::Cancelled => Some(Event::ProcessCancelled {
            process_id: process.id,
        }),
        ProcessStatus::Failed => Some(Event::ProcessFailed {
            process_id: process.id,
            error: process.error.clone().unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stats(total: u64, success: u64, skipped: u64) -> ProcessStats {
        ProcessStats {
            total,
            processed: success,
            success,
            errors: 0,
            skipped,
            ..ProcessStats::default()
        }
    }

    fn running(step: StepName) -> Process {
        create_process(
            ViewRole::Home,
            step,
            "Structured Data".to_string(),
            ProcessStats::default(),
        )
    }

    #[test]
    fn test_create_process() {
        let process = running(StepName::GenerateAiData);

        assert!(process.is_active);
        assert!(!process.is_completed && !process.is_cancelled);
        assert_eq!(process.progress, 0.0);
        assert_eq!(process.origin, ViewRole::Home);
        assert!(process.channel_token.starts_with("session_"));

        let other = running(StepName::GenerateAiData);
        assert_ne!(process.id, other.id);
        assert_ne!(process.channel_token, other.channel_token);
    }

    #[test]
    fn test_zero_total_is_zero_progress() {
        for step in StepName::ALL {
            assert_eq!(compute_progress(step, &ProcessStats::default()), 0.0);
        }

        let mut empty = stats(0, 5, 5);
        empty.initial_empty_rows = Some(0);
        assert_eq!(compute_progress(StepName::BuildDescription, &empty), 0.0);
        assert_eq!(compute_progress(StepName::GenerateAiData, &empty), 0.0);
    }

    #[test]
    fn test_default_formula_counts_skipped_rows() {
        let progress = compute_progress(StepName::AiSourceComparables, &stats(200, 50, 50));
        assert_eq!(progress, 50.0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let progress = compute_progress(StepName::ExtractPrice, &stats(10, 30, 5));
        assert_eq!(progress, 100.0);
    }

    #[test]
    fn test_progress_never_decreases_while_active() {
        let mut process = running(StepName::GenerateAiData);
        let reports = [
            stats(100, 0, 0),
            stats(100, 10, 0),
            stats(100, 10, 20),
            stats(100, 45, 20),
            stats(100, 80, 20),
        ];

        let mut last = 0.0;
        for report in &reports {
            apply_progress(&mut process, report);
            assert!(process.progress >= last);
            assert!((0.0..=100.0).contains(&process.progress));
            last = process.progress;
        }
        assert_eq!(process.progress, 100.0);
        assert!(process.is_active);

        // A late report with smaller counts does not pull progress back.
        apply_progress(&mut process, &stats(100, 10, 20));
        assert_eq!(process.progress, 100.0);
    }

    #[test]
    fn test_build_description_scenario() {
        let mut process = running(StepName::BuildDescription);

        let first = apply_progress(&mut process, &stats(100, 0, 40));
        assert_eq!(process.stats.initial_empty_rows, Some(60));
        assert_eq!(
            first,
            ProgressUpdate::Applied {
                progress: 0.0,
                reached_full: false
            }
        );

        let second = apply_progress(&mut process, &stats(100, 60, 40));
        assert_eq!(process.stats.initial_empty_rows, Some(60));
        assert_eq!(
            second,
            ProgressUpdate::Applied {
                progress: 100.0,
                reached_full: true
            }
        );
        assert!(process.is_active);
    }

    #[test]
    fn test_initial_empty_rows_replaces_early_estimate_once() {
        let mut process = running(StepName::BuildDescription);

        // First report before the server counted filled rows.
        apply_progress(&mut process, &stats(100, 0, 0));
        assert_eq!(process.stats.initial_empty_rows, Some(100));

        apply_progress(&mut process, &stats(100, 0, 40));
        assert_eq!(process.stats.initial_empty_rows, Some(60));

        apply_progress(&mut process, &stats(100, 10, 45));
        assert_eq!(process.stats.initial_empty_rows, Some(60));
    }

    #[test]
    fn test_server_report_replaces_launch_estimate() {
        let mut process = create_process(
            ViewRole::Home,
            StepName::BuildDescription,
            "Structured Data".to_string(),
            ProcessStats {
                total: 100,
                initial_empty_rows: Some(80),
                ..ProcessStats::default()
            },
        );
        assert!(!process.stats.empty_rows_reported);

        apply_progress(&mut process, &stats(100, 0, 0));
        assert_eq!(process.stats.initial_empty_rows, Some(100));
        assert!(process.stats.empty_rows_reported);

        let update = apply_progress(&mut process, &stats(100, 80, 0));
        assert_eq!(
            update,
            ProgressUpdate::Applied {
                progress: 80.0,
                reached_full: false
            }
        );
    }

    #[test]
    fn test_report_without_total_keeps_known_total() {
        let mut process = running(StepName::GenerateAiData);
        apply_progress(&mut process, &stats(80, 10, 0));
        apply_progress(&mut process, &stats(0, 20, 0));

        assert_eq!(process.stats.total, 80);
        assert_eq!(process.stats.success, 20);
        assert_eq!(process.progress, 25.0);
    }

    #[test]
    fn test_terminal_is_idempotent() {
        let mut process = running(StepName::AiSimilarComparable);
        apply_progress(&mut process, &stats(10, 4, 0));
        let now = process.start_time + Duration::seconds(65);

        assert!(apply_terminal(
            &mut process,
            Terminal::Completed,
            Some(&stats(10, 9, 1)),
            now
        ));
        let once = process.clone();

        assert!(!apply_terminal(
            &mut process,
            Terminal::Completed,
            Some(&stats(10, 1, 1)),
            now + Duration::seconds(30)
        ));
        assert_eq!(process, once);

        assert!(!process.is_active);
        assert!(process.is_completed);
        assert_eq!(process.progress, 100.0);
        assert_eq!(process.elapsed_time, 65);
        assert_eq!(process.stats.success, 9);
    }

    #[test]
    fn test_terminal_process_never_reactivates() {
        let mut process = running(StepName::ExtractPrice);
        apply_progress(&mut process, &stats(10, 2, 0));
        let before = process.progress;

        apply_terminal(&mut process, Terminal::Cancelled, None, Utc::now());
        assert!(process.is_cancelled);
        assert_eq!(process.progress, before);

        assert_eq!(
            apply_progress(&mut process, &stats(10, 10, 0)),
            ProgressUpdate::Ignored
        );
        assert!(!apply_terminal(
            &mut process,
            Terminal::Completed,
            None,
            Utc::now()
        ));
        assert!(!process.is_active);
        assert!(!process.is_completed);
        assert!(!tick(&mut process, Utc::now() + Duration::seconds(10)));
    }

    #[test]
    fn test_adopt_terminal_copies_peer_values() {
        let mut local = running(StepName::GenerateAiData);
        apply_progress(&mut local, &stats(10, 3, 0));

        let mut peer = local.clone();
        let finished_at = peer.start_time + Duration::seconds(42);
        apply_terminal(
            &mut peer,
            Terminal::Completed,
            Some(&stats(10, 8, 2)),
            finished_at,
        );
        peer.history_saved = true;

        assert!(adopt_terminal(&mut local, &peer));
        assert_eq!(local.stats, peer.stats);
        assert_eq!(local.elapsed_time, 42);
        assert_eq!(local.progress, 100.0);
        assert!(local.is_completed);
        assert!(local.history_saved);

        assert!(!adopt_terminal(&mut local, &peer));
    }

    #[test]
    fn test_adopt_ignores_active_peer() {
        let mut local = running(StepName::GenerateAiData);
        let peer = local.clone();
        assert!(!adopt_terminal(&mut local, &peer));
        assert!(local.is_active);
    }

    #[test]
    fn test_tick_advances_elapsed() {
        let mut process = running(StepName::GenerateAiData);
        let later = process.start_time + Duration::seconds(3);

        assert!(tick(&mut process, later));
        assert_eq!(process.elapsed_time, 3);
        assert!(!tick(&mut process, later));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "0m 00s");
        assert_eq!(format_elapsed(65), "1m 05s");
        assert_eq!(format_elapsed(3600), "60m 00s");
    }

    #[test]
    fn test_history_messages() {
        let mut process = running(StepName::BuildDescription);
        assert!(history_message(&process).is_none());

        apply_terminal(
            &mut process,
            Terminal::Completed,
            Some(&ProcessStats {
                total: 100,
                processed: 58,
                success: 58,
                errors: 2,
                skipped: 40,
                ..ProcessStats::default()
            }),
            Utc::now(),
        );
        assert_eq!(
            history_message(&process).as_deref(),
            Some("Build Description completed: 58 succeeded, 2 errors, 40 skipped")
        );

        let mut failed = running(StepName::AiSourceComparables);
        apply_terminal(
            &mut failed,
            Terminal::Failed("quota exceeded".to_string()),
            None,
            Utc::now(),
        );
        let entry = history_entry(&failed, Utc::now()).expect("terminal process has history");
        assert_eq!(entry.message, "AI Source Comparables failed: quota exceeded");
        assert_eq!(entry.step.as_deref(), Some("AI Source Comparables"));
        assert_eq!(entry.sheet_name, "Structured Data");
        assert!(matches!(
            terminal_event(&failed),
            Some(Event::ProcessFailed { error, .. }) if error == "quota exceeded"
        ));
    }

    #[test]
    fn test_process_from_notice() {
        let original = running(StepName::GenerateAiData);
        let notice = DiscoveryNotice::from(&original);
        let discovered = process_from_notice(&notice, original.start_time + Duration::seconds(2));

        assert_eq!(discovered.id, original.id);
        assert_eq!(discovered.channel_token, original.channel_token);
        assert_eq!(discovered.origin, ViewRole::Home);
        assert_eq!(discovered.elapsed_time, 2);
        assert!(discovered.is_active);
    }
}
