//! External enrichment backend contract.
//!
//! The backend reads and writes the spreadsheet, calls the language-model
//! providers and pushes per-job progress over a channel keyed by the
//! process's channel token. The progress tracker only needs the operations
//! below.

pub mod http;
pub mod mock;

pub use http::HttpBackend;
pub use mock::{MockBackend, SubmissionBehavior};

use async_trait::async_trait;
use ek_protocol::channel_models::ChannelMessage;
use ek_protocol::job_models::{HistoryEntry, JobOutcome, JobRequest, SharedProcessRecord};
use std::collections::BTreeMap;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;
use uuid::Uuid;

/// Inbound messages of one progress channel connection.
///
/// The stream ends when the connection closes.
pub type ChannelStream = Pin<Box<dyn Stream<Item = Result<ChannelMessage, BackendError>> + Send>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend not reachable: {0}")]
    Unavailable(String),
    #[error("Request failed: {0}")]
    Http(String),
    #[error("Backend rejected the job: {0}")]
    Rejected(String),
    #[error("Progress channel error: {0}")]
    Channel(String),
    #[error("Malformed backend response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait EnrichmentBackend: Send + Sync {
    /// Runs one step over a sheet; resolves when the backend finished.
    async fn submit_job(&self, request: JobRequest) -> Result<JobOutcome, BackendError>;

    async fn open_progress_channel(&self, channel_token: &str)
        -> Result<ChannelStream, BackendError>;

    /// Best-effort; the backend answers on the progress channel.
    async fn request_cancel(&self, channel_token: &str) -> Result<(), BackendError>;

    async fn append_history(&self, entry: HistoryEntry) -> Result<(), BackendError>;

    /// Newest first.
    async fn list_history(
        &self,
        limit: u32,
        sheet_name: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, BackendError>;

    /// All stored history, keyed by sheet name.
    async fn list_history_grouped(&self)
        -> Result<BTreeMap<String, Vec<HistoryEntry>>, BackendError>;

    async fn clear_history(&self) -> Result<(), BackendError>;

    /// Channel tokens with at least one open progress connection.
    async fn list_active_sessions(&self) -> Result<Vec<String>, BackendError>;

    /// Mirrored records: active ones plus those finished within the last day.
    async fn list_shared_processes(&self) -> Result<Vec<SharedProcessRecord>, BackendError>;

    /// Inserts or replaces the record for `record.process_id`.
    async fn save_shared_process(&self, record: SharedProcessRecord) -> Result<(), BackendError>;

    async fn delete_shared_process(&self, process_id: Uuid) -> Result<(), BackendError>;
}
