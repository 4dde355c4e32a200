//! In-memory backend for tests and offline runs.

use crate::backend::{BackendError, ChannelStream, EnrichmentBackend};
use async_trait::async_trait;
use ek_protocol::channel_models::{ChannelMessage, ChannelMessageKind};
use ek_protocol::job_models::{HistoryEntry, JobOutcome, JobRequest, SharedProcessRecord};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// How `submit_job` answers.
#[derive(Debug, Clone)]
pub enum SubmissionBehavior {
    /// Never resolves, like a job that runs for a long time.
    Pending,
    Succeed(JobOutcome),
    SucceedAfter(Duration, JobOutcome),
    Fail(BackendError),
}

struct MockState {
    channels: HashMap<String, broadcast::Sender<ChannelMessage>>,
    submission: SubmissionBehavior,
    channel_failure: Option<BackendError>,
    announce_cancellations: bool,
    submitted: Vec<JobRequest>,
    cancellations: Vec<String>,
    history: Vec<HistoryEntry>,
    shared: HashMap<Uuid, SharedProcessRecord>,
}

/// Scriptable backend shared between the sessions under test.
///
/// Every connection opened for a token receives each message pushed for
/// that token, which mirrors the server broadcasting to all sockets of a
/// session.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                channels: HashMap::new(),
                submission: SubmissionBehavior::Pending,
                channel_failure: None,
                announce_cancellations: true,
                submitted: Vec::new(),
                cancellations: Vec::new(),
                history: Vec::new(),
                shared: HashMap::new(),
            })),
        }
    }

    pub fn with_submission(self, behavior: SubmissionBehavior) -> Self {
        self.set_submission(behavior);
        self
    }

    /// Opening a channel fails with `error`.
    pub fn with_channel_failure(self, error: BackendError) -> Self {
        self.lock().channel_failure = Some(error);
        self
    }

    /// Cancellation requests are recorded but not answered on the channel.
    pub fn with_silent_cancellations(self) -> Self {
        self.lock().announce_cancellations = false;
        self
    }

    pub fn set_submission(&self, behavior: SubmissionBehavior) {
        self.lock().submission = behavior;
    }

    /// Pushes `message` to every open connection for `token`.
    ///
    /// Returns the number of connections that received it.
    pub fn push(&self, token: &str, message: ChannelMessage) -> usize {
        let state = self.lock();
        state
            .channels
            .get(token)
            .and_then(|sender| sender.send(message).ok())
            .unwrap_or(0)
    }

    /// Drops every connection for `token` without a terminal message.
    pub fn drop_connections(&self, token: &str) {
        self.lock().channels.remove(token);
    }

    pub fn connection_count(&self, token: &str) -> usize {
        self.lock()
            .channels
            .get(token)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn submitted(&self) -> Vec<JobRequest> {
        self.lock().submitted.clone()
    }

    pub fn cancellations(&self) -> Vec<String> {
        self.lock().cancellations.clone()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().history.clone()
    }

    pub fn shared_process(&self, id: &Uuid) -> Option<SharedProcessRecord> {
        self.lock().shared.get(id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl EnrichmentBackend for MockBackend {
    async fn submit_job(&self, request: JobRequest) -> Result<JobOutcome, BackendError> {
        let behavior = {
            let mut state = self.lock();
            state.submitted.push(request);
            state.submission.clone()
        };

        match behavior {
            SubmissionBehavior::Pending => std::future::pending().await,
            SubmissionBehavior::Succeed(outcome) => Ok(outcome),
            SubmissionBehavior::SucceedAfter(delay, outcome) => {
                tokio::time::sleep(delay).await;
                Ok(outcome)
            }
            SubmissionBehavior::Fail(error) => Err(error),
        }
    }

    async fn open_progress_channel(
        &self,
        channel_token: &str,
    ) -> Result<ChannelStream, BackendError> {
        let mut receiver = {
            let mut state = self.lock();
            if let Some(error) = &state.channel_failure {
                return Err(error.clone());
            }
            state
                .channels
                .entry(channel_token.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(message) => yield Ok(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        yield Err(BackendError::Channel(format!("lagged by {skipped} messages")));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn request_cancel(&self, channel_token: &str) -> Result<(), BackendError> {
        let announce = {
            let mut state = self.lock();
            state.cancellations.push(channel_token.to_string());
            state.announce_cancellations
        };

        if announce {
            self.push(channel_token, ChannelMessage::new(ChannelMessageKind::Cancelled));
        }
        Ok(())
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<(), BackendError> {
        let mut state = self.lock();
        let id = i64::try_from(state.history.len()).unwrap_or(i64::MAX) + 1;
        state.history.push(HistoryEntry {
            id: Some(id),
            ..entry
        });
        Ok(())
    }

    async fn list_history(
        &self,
        limit: u32,
        sheet_name: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, BackendError> {
        let state = self.lock();
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|entry| sheet_name.map_or(true, |name| entry.sheet_name == name))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_history_grouped(
        &self,
    ) -> Result<BTreeMap<String, Vec<HistoryEntry>>, BackendError> {
        let state = self.lock();
        let mut grouped: BTreeMap<String, Vec<HistoryEntry>> = BTreeMap::new();
        for entry in state.history.iter().rev() {
            grouped
                .entry(entry.sheet_name.clone())
                .or_default()
                .push(entry.clone());
        }
        Ok(grouped)
    }

    async fn clear_history(&self) -> Result<(), BackendError> {
        self.lock().history.clear();
        Ok(())
    }

    async fn list_active_sessions(&self) -> Result<Vec<String>, BackendError> {
        let state = self.lock();
        let mut tokens: Vec<String> = state
            .channels
            .iter()
            .filter(|(_, sender)| sender.receiver_count() > 0)
            .map(|(token, _)| token.clone())
            .collect();
        tokens.sort();
        Ok(tokens)
    }

    async fn list_shared_processes(&self) -> Result<Vec<SharedProcessRecord>, BackendError> {
        let state = self.lock();
        let mut records: Vec<SharedProcessRecord> = state.shared.values().cloned().collect();
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(records)
    }

    async fn save_shared_process(&self, record: SharedProcessRecord) -> Result<(), BackendError> {
        self.lock().shared.insert(record.process_id, record);
        Ok(())
    }

    async fn delete_shared_process(&self, process_id: Uuid) -> Result<(), BackendError> {
        self.lock().shared.remove(&process_id);
        Ok(())
    }
}
