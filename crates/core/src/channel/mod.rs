//! Progress Channel Adapter.
//!
//! Owns at most one push connection per process id and the per-process
//! elapsed-time ticker. Inbound messages are forwarded to the session actor
//! as [`SessionInput`]s; the adapter never mutates process state itself.
//!
//! A connection ending is not a terminal signal. The adapter only drops its
//! handle so the session can reconnect later.

use crate::backend::EnrichmentBackend;
use crate::engine::SessionInput;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Minimum delay between a connection ending and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

struct Connection {
    generation: u64,
    task: JoinHandle<()>,
}

pub struct ChannelAdapter {
    backend: Arc<dyn EnrichmentBackend>,
    inputs: UnboundedSender<SessionInput>,
    ticker_interval: Duration,
    connections: HashMap<Uuid, Connection>,
    tickers: HashMap<Uuid, JoinHandle<()>>,
    closed_at: HashMap<Uuid, Instant>,
    next_generation: u64,
}

impl ChannelAdapter {
    pub fn new(
        backend: Arc<dyn EnrichmentBackend>,
        inputs: UnboundedSender<SessionInput>,
        ticker_interval: Duration,
    ) -> Self {
        Self {
            backend,
            inputs,
            ticker_interval,
            connections: HashMap::new(),
            tickers: HashMap::new(),
            closed_at: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Opens the push connection for `id`.
    ///
    /// Returns `false` if a connection for `id` is already open.
    pub fn open(&mut self, id: Uuid, channel_token: &str) -> bool {
        if self.connections.contains_key(&id) {
            debug!(process_id = %id, "progress channel already open");
            return false;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.backend),
            self.inputs.clone(),
            id,
            generation,
            channel_token.to_string(),
        ));

        self.closed_at.remove(&id);
        self.connections.insert(id, Connection { generation, task });
        true
    }

    /// Reopens a connection that ended at least [`RECONNECT_DELAY`] ago.
    pub fn reopen_if_due(&mut self, id: Uuid, channel_token: &str) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }
        let due = self
            .closed_at
            .get(&id)
            .map_or(true, |closed| closed.elapsed() >= RECONNECT_DELAY);
        due && self.open(id, channel_token)
    }

    /// Drops the handle of a connection that ended on its own.
    ///
    /// Stale notices from a connection that was already replaced are
    /// ignored.
    pub fn on_closed(&mut self, id: Uuid, generation: u64) -> bool {
        match self.connections.get(&id) {
            Some(connection) if connection.generation == generation => {
                self.connections.remove(&id);
                self.closed_at.insert(id, Instant::now());
                true
            }
            _ => false,
        }
    }

    pub fn is_open(&self, id: &Uuid) -> bool {
        self.connections.contains_key(id)
    }

    pub fn open_count(&self) -> usize {
        self.connections.len()
    }

    /// Starts the elapsed-time ticker for `id` unless one is running.
    pub fn start_ticker(&mut self, id: Uuid) -> bool {
        if self.tickers.contains_key(&id) {
            return false;
        }

        let inputs = self.inputs.clone();
        let period = self.ticker_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                if inputs.send(SessionInput::Tick { id }).is_err() {
                    break;
                }
            }
        });

        self.tickers.insert(id, task);
        true
    }

    pub fn has_ticker(&self, id: &Uuid) -> bool {
        self.tickers.contains_key(id)
    }

    /// Closes the connection and stops the ticker of `id`.
    pub fn release(&mut self, id: &Uuid) {
        if let Some(connection) = self.connections.remove(id) {
            connection.task.abort();
            debug!(process_id = %id, "progress channel closed");
        }
        if let Some(ticker) = self.tickers.remove(id) {
            ticker.abort();
        }
        self.closed_at.remove(id);
    }

    pub fn shutdown(&mut self) {
        for (_, connection) in self.connections.drain() {
            connection.task.abort();
        }
        for (_, ticker) in self.tickers.drain() {
            ticker.abort();
        }
        self.closed_at.clear();
    }
}

impl Drop for ChannelAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_connection(
    backend: Arc<dyn EnrichmentBackend>,
    inputs: UnboundedSender<SessionInput>,
    id: Uuid,
    generation: u64,
    channel_token: String,
) {
    match backend.open_progress_channel(&channel_token).await {
        Ok(mut stream) => {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(message) => {
                        if inputs.send(SessionInput::Channel { id, message }).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!(process_id = %id, error = %e, "progress channel error"),
                }
            }
            debug!(process_id = %id, "progress channel ended");
        }
        Err(e) => warn!(process_id = %id, error = %e, "failed to open progress channel"),
    }

    let _ = inputs.send(SessionInput::ChannelClosed { id, generation });
}
