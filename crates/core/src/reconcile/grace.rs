//! Grace-period timers armed when progress reaches 100%.

use crate::engine::SessionInput;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub struct GraceTimers {
    period: Duration,
    inputs: UnboundedSender<SessionInput>,
    timers: HashMap<Uuid, JoinHandle<()>>,
}

impl GraceTimers {
    pub fn new(period: Duration, inputs: UnboundedSender<SessionInput>) -> Self {
        Self {
            period,
            inputs,
            timers: HashMap::new(),
        }
    }

    /// Arms the timer for `id`; an armed timer is left running.
    pub fn arm(&mut self, id: Uuid) -> bool {
        if self.timers.contains_key(&id) {
            return false;
        }

        let inputs = self.inputs.clone();
        let period = self.period;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(period).await;
            let _ = inputs.send(SessionInput::GraceExpired { id });
        });
        self.timers.insert(id, timer);
        true
    }

    pub fn cancel(&mut self, id: &Uuid) -> bool {
        match self.timers.remove(id) {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// Consumes the expiry of `id`.
    ///
    /// Returns `false` for an expiry that raced with a cancellation.
    pub fn fired(&mut self, id: &Uuid) -> bool {
        self.timers.remove(id).is_some()
    }

    pub fn is_armed(&self, id: &Uuid) -> bool {
        self.timers.contains_key(id)
    }

    pub fn shutdown(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

impl Drop for GraceTimers {
    fn drop(&mut self) {
        self.shutdown();
    }
}
