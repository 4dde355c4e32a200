//! Cross-view reconciliation tests.
//!
//! Home and Monitor are mounted over one store and one backend. These
//! tests verify that:
//! - A process launched in one view shows up exactly once in the other
//! - Both views agree on the terminal state, even when one misses the message
//! - History is written once per process, even if the launching view is gone
//! - Cancelled or removed processes never come back
//! - Only the launching view drops a record from the backend's shared list

mod common;

use common::*;
use ek_core::state::manager::SessionError;
use ek_protocol::channel_models::ChannelMessage;
use ek_protocol::ipc::Event;
use ek_protocol::process_models::{ProcessStatus, StepName, ViewRole};
use tokio::time::sleep;

#[tokio::test]
async fn test_monitor_discovers_home_process_once() {
    let harness = Harness::new();
    let home = harness.mount(ViewRole::Home);
    let mut monitor = harness.mount(ViewRole::Monitor);

    let process = home.handle.launch(job(StepName::GenerateAiData)).await.unwrap();

    let discovered =
        wait_for_event(&mut monitor, |e| matches!(e, Event::ProcessDiscovered { .. })).await;
    assert!(matches!(
        discovered,
        Event::ProcessDiscovered { process: p } if p.id == process.id && p.origin == ViewRole::Home
    ));

    // Both views subscribe to the same channel.
    wait_for_connections(&harness.backend, &process.channel_token, 2).await;

    sleep(POLL_INTERVAL * 5).await;
    assert_eq!(count_discovered(&drain(&mut monitor), process.id), 0);
    assert_eq!(monitor.handle.process_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_home_discovers_monitor_process() {
    let harness = Harness::new();
    let home = harness.mount(ViewRole::Home);
    let monitor = harness.mount(ViewRole::Monitor);

    let process = monitor
        .handle
        .launch(job(StepName::AiSourceComparables))
        .await
        .unwrap();

    let seen = wait_for_process(&home, process.id, |p| p.is_active).await;
    assert_eq!(seen.origin, ViewRole::Monitor);
    assert_eq!(seen.channel_token, process.channel_token);
}

#[tokio::test]
async fn test_both_views_complete_on_terminal_message() {
    let harness = Harness::new();
    let mut home = harness.mount(ViewRole::Home);
    let mut monitor = harness.mount(ViewRole::Monitor);

    let process = home.handle.launch(job(StepName::GenerateAiData)).await.unwrap();
    wait_for_connections(&harness.backend, &process.channel_token, 2).await;

    harness
        .backend
        .push(&process.channel_token, ChannelMessage::progress(20, 5, 0));
    let home_view = wait_for_process(&home, process.id, |p| p.stats.success == 5).await;
    let monitor_view = wait_for_process(&monitor, process.id, |p| p.stats.success == 5).await;
    assert_eq!(home_view.progress, monitor_view.progress);

    harness
        .backend
        .push(&process.channel_token, ChannelMessage::complete(20, 18, 2, 0));
    wait_for_event(&mut home, |e| is_completed_event(e, process.id)).await;
    wait_for_event(&mut monitor, |e| is_completed_event(e, process.id)).await;

    wait_for_history(&harness.backend, 1).await;
    sleep(POLL_INTERVAL * 4).await;
    assert_eq!(harness.backend.history().len(), 1);
}

#[tokio::test]
async fn test_monitor_adopts_terminal_state_it_missed() {
    let harness = Harness::new();
    let home = harness.mount(ViewRole::Home);
    let mut monitor = harness.mount(ViewRole::Monitor);

    let process = home.handle.launch(job(StepName::GenerateAiData)).await.unwrap();
    wait_for_process(&monitor, process.id, |p| p.is_active).await;

    // No channel message: only the home registry records the completion.
    home.handle.mark_completed(process.id).await.unwrap();

    wait_for_event(&mut monitor, |e| is_completed_event(e, process.id)).await;
    let adopted = monitor.handle.get_process(process.id).await.unwrap().unwrap();
    assert_eq!(adopted.status(), ProcessStatus::Completed);
    assert_eq!(adopted.progress, 100.0);

    wait_for_history(&harness.backend, 1).await;
    sleep(POLL_INTERVAL * 4).await;
    assert_eq!(harness.backend.history().len(), 1);
}

#[tokio::test]
async fn test_home_adopts_terminal_state_from_monitor() {
    let harness = Harness::new();
    let mut home = harness.mount(ViewRole::Home);
    let monitor = harness.mount(ViewRole::Monitor);

    let process = home.handle.launch(job(StepName::ExtractPrice)).await.unwrap();
    wait_for_process(&monitor, process.id, |p| p.is_active).await;

    monitor.handle.mark_completed(process.id).await.unwrap();

    wait_for_event(&mut home, |e| is_completed_event(e, process.id)).await;
    // The launching view writes the history entry, whoever finished first.
    wait_for_history(&harness.backend, 1).await;
}

#[tokio::test]
async fn test_monitor_records_history_when_home_is_gone() {
    let harness = Harness::new();
    let home = harness.mount(ViewRole::Home);
    let mut monitor = harness.mount(ViewRole::Monitor);

    let process = home.handle.launch(job(StepName::GenerateAiData)).await.unwrap();
    wait_for_connections(&harness.backend, &process.channel_token, 2).await;

    home.handle.shutdown().await.unwrap();

    harness
        .backend
        .push(&process.channel_token, ChannelMessage::complete(10, 9, 1, 0));
    wait_for_event(&mut monitor, |e| is_completed_event(e, process.id)).await;

    wait_for_history(&harness.backend, 1).await;
    sleep(GRACE_PERIOD + POLL_INTERVAL * 4).await;
    let history = harness.backend.history();
    assert_eq!(history.len(), 1);
    assert!(history[0].message.contains("completed"));

    let recorded = monitor.handle.get_process(process.id).await.unwrap().unwrap();
    assert!(recorded.history_saved);
    wait_for_shared(&harness.backend, process.id, |r| r.is_some_and(|r| r.is_completed)).await;
}

#[tokio::test]
async fn test_monitor_removal_keeps_home_shared_record() {
    let harness = Harness::new();
    let home = harness.mount(ViewRole::Home);
    let monitor = harness.mount(ViewRole::Monitor);

    let process = home.handle.launch(job(StepName::GenerateAiData)).await.unwrap();
    wait_for_process(&monitor, process.id, |p| p.is_active).await;
    wait_for_shared(&harness.backend, process.id, |r| r.is_some()).await;

    monitor.handle.remove(process.id).await.unwrap();
    sleep(POLL_INTERVAL * 3).await;
    assert!(harness.backend.shared_process(&process.id).is_some());

    home.handle.remove(process.id).await.unwrap();
    wait_for_shared(&harness.backend, process.id, |r| r.is_none()).await;
}

#[tokio::test]
async fn test_cancelled_process_never_reappears() {
    let harness = Harness::new();
    let mut home = harness.mount(ViewRole::Home);
    let mut monitor = harness.mount(ViewRole::Monitor);

    let process = home.handle.launch(job(StepName::GenerateAiData)).await.unwrap();
    wait_for_connections(&harness.backend, &process.channel_token, 2).await;

    home.handle.cancel(process.id).await.unwrap();
    wait_for_event(&mut monitor, |e| is_cancelled_event(e, process.id)).await;

    monitor.handle.remove(process.id).await.unwrap();
    sleep(POLL_INTERVAL * 5).await;

    assert!(home.handle.get_process(process.id).await.unwrap().is_none());
    assert!(monitor.handle.get_process(process.id).await.unwrap().is_none());
    assert_eq!(count_discovered(&drain(&mut monitor), process.id), 0);
    assert!(!drain(&mut home)
        .iter()
        .any(|e| matches!(e, Event::ProcessDiscovered { .. })));
}

#[tokio::test]
async fn test_process_dropped_by_peer_is_cancelled() {
    let harness = Harness::new();
    let home = harness.mount(ViewRole::Home);
    let mut monitor = harness.mount(ViewRole::Monitor);

    let process = home.handle.launch(job(StepName::GenerateAiData)).await.unwrap();
    wait_for_process(&monitor, process.id, |p| p.is_active).await;

    home.handle.remove(process.id).await.unwrap();

    wait_for_event(&mut monitor, |e| is_cancelled_event(e, process.id)).await;
    let held = monitor.handle.get_process(process.id).await.unwrap().unwrap();
    assert_eq!(held.status(), ProcessStatus::Cancelled);
}

#[tokio::test]
async fn test_only_the_launching_view_can_cancel() {
    let harness = Harness::new();
    let home = harness.mount(ViewRole::Home);
    let monitor = harness.mount(ViewRole::Monitor);

    let process = home.handle.launch(job(StepName::GenerateAiData)).await.unwrap();
    wait_for_process(&monitor, process.id, |p| p.is_active).await;

    let result = monitor.handle.cancel(process.id).await;
    assert!(matches!(result, Err(SessionError::NotInitiator(id)) if id == process.id));

    assert!(harness.backend.cancellations().is_empty());
    assert!(home.handle.get_process(process.id).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_monitor_mounted_late_restores_running_process() {
    let harness = Harness::new();
    let home = harness.mount(ViewRole::Home);
    let process = home.handle.launch(job(StepName::GenerateAiData)).await.unwrap();

    let monitor = harness.mount(ViewRole::Monitor);
    wait_for_process(&monitor, process.id, |p| p.is_active).await;
    wait_for_connections(&harness.backend, &process.channel_token, 2).await;

    monitor.handle.shutdown().await.unwrap();

    // The monitor's own registry brings the process back on remount.
    let mut monitor = harness.mount(ViewRole::Monitor);
    let state = wait_for_event(&mut monitor, |e| matches!(e, Event::DashboardState { .. })).await;
    assert!(matches!(state, Event::DashboardState { processes } if processes.len() == 1));
    wait_for_connections(&harness.backend, &process.channel_token, 2).await;
}
