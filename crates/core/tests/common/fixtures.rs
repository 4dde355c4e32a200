//! Test fixtures for mounting views against shared in-memory state.

use ek_core::backend::MockBackend;
use ek_core::config::models::SessionSettings;
use ek_core::engine::ViewSession;
use ek_core::state::manager::{JobSpec, SessionHandle};
use ek_core::store::MemoryStore;
use ek_protocol::ipc::Event;
use ek_protocol::process_models::{StepName, ViewRole};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub const GRACE_PERIOD: Duration = Duration::from_millis(150);
pub const POLL_INTERVAL: Duration = Duration::from_millis(40);

/// Upper bound for any single wait in these tests.
pub const WAIT_LIMIT: Duration = Duration::from_secs(3);

/// Short timers so the reconciliation paths run within a test.
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        grace_period: GRACE_PERIOD,
        poll_interval: POLL_INTERVAL,
        ticker_interval: Duration::from_millis(50),
        prompts: Vec::new(),
    }
}

/// One mounted view and the events it emitted.
pub struct View {
    pub handle: SessionHandle,
    pub events: UnboundedReceiver<Event>,
}

/// Both views share the store and the backend, like two tabs of one browser.
pub struct Harness {
    pub store: MemoryStore,
    pub backend: MockBackend,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backend(MockBackend::new())
    }

    pub fn with_backend(backend: MockBackend) -> Self {
        Self {
            store: MemoryStore::new(),
            backend,
        }
    }

    pub fn mount(&self, role: ViewRole) -> View {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ViewSession::mount(
            role,
            fast_settings(),
            Arc::new(self.backend.clone()),
            Arc::new(self.store.clone()),
            tx,
        );
        View { handle, events: rx }
    }
}

#[allow(dead_code)]
pub fn job(step: StepName) -> JobSpec {
    JobSpec::new("1AbCsheet", step).sheet_name("Structured Data")
}
