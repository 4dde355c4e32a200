//! Waiting assertions for asynchronous session state.
#![allow(dead_code)]

use crate::common::fixtures::{View, WAIT_LIMIT};
use ek_core::backend::MockBackend;
use ek_protocol::ipc::Event;
use ek_protocol::job_models::SharedProcessRecord;
use ek_protocol::process_models::Process;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use uuid::Uuid;

const STEP: Duration = Duration::from_millis(10);

/// Receive events until one matches `predicate`; panics after the wait limit.
pub async fn wait_for_event(view: &mut View, predicate: impl Fn(&Event) -> bool) -> Event {
    let found = timeout(WAIT_LIMIT, async {
        while let Some(event) = view.events.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;

    match found {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event channel closed before the expected event"),
        Err(_) => panic!("timed out waiting for event on {} view", view.handle.role()),
    }
}

/// Poll the view until the process satisfies `predicate`.
pub async fn wait_for_process(
    view: &View,
    id: Uuid,
    predicate: impl Fn(&Process) -> bool,
) -> Process {
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        if let Some(process) = view.handle.get_process(id).await.unwrap() {
            if predicate(&process) {
                return process;
            }
        }
        assert!(
            Instant::now() < deadline,
            "process {id} never reached the expected state on {} view",
            view.handle.role()
        );
        sleep(STEP).await;
    }
}

/// Poll until the view no longer holds `id`.
pub async fn wait_for_absence(view: &View, id: Uuid) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while view.handle.get_process(id).await.unwrap().is_some() {
        assert!(Instant::now() < deadline, "process {id} was never removed");
        sleep(STEP).await;
    }
}

/// Wait until `count` connections are subscribed to `token`.
pub async fn wait_for_connections(backend: &MockBackend, token: &str, count: usize) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while backend.connection_count(token) < count {
        assert!(
            Instant::now() < deadline,
            "expected {count} connections for {token}, have {}",
            backend.connection_count(token)
        );
        sleep(STEP).await;
    }
}

/// Wait until every connection for `token` is gone.
pub async fn wait_for_disconnect(backend: &MockBackend, token: &str) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while backend.connection_count(token) > 0 {
        assert!(Instant::now() < deadline, "connections for {token} were never closed");
        sleep(STEP).await;
    }
}

/// Wait until the backend holds `count` history entries.
pub async fn wait_for_history(backend: &MockBackend, count: usize) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while backend.history().len() < count {
        assert!(Instant::now() < deadline, "history never reached {count} entries");
        sleep(STEP).await;
    }
}

/// Wait until the backend's shared record for `id` satisfies `predicate`.
///
/// `None` is passed while no record is stored.
pub async fn wait_for_shared(
    backend: &MockBackend,
    id: Uuid,
    predicate: impl Fn(Option<&SharedProcessRecord>) -> bool,
) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !predicate(backend.shared_process(&id).as_ref()) {
        assert!(
            Instant::now() < deadline,
            "shared record for {id} never reached the expected state"
        );
        sleep(STEP).await;
    }
}

/// Everything the view emitted so far, without waiting.
pub fn drain(view: &mut View) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = view.events.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_discovered(events: &[Event], id: Uuid) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::ProcessDiscovered { process } if process.id == id))
        .count()
}

pub fn is_completed_event(event: &Event, id: Uuid) -> bool {
    matches!(event, Event::ProcessCompleted { process } if process.id == id)
}

pub fn is_cancelled_event(event: &Event, id: Uuid) -> bool {
    matches!(event, Event::ProcessCancelled { process_id } if *process_id == id)
}
