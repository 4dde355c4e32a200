//! Backend client for the enrichment HTTP service.
//!
//! Jobs, history and the shared process list go over plain HTTP; progress
//! arrives on a WebSocket at `/ws/{channel_token}`.

use crate::backend::{BackendError, ChannelStream, EnrichmentBackend};
use async_trait::async_trait;
use ek_protocol::channel_models::ChannelMessage;
use ek_protocol::config_models::BackendSettings;
use ek_protocol::job_models::{HistoryEntry, JobOutcome, JobRequest, JobStats, SharedProcessRecord};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct HttpBackend {
    client: Client,
    base_url: String,
    ws_url: String,
}

/// Body of `POST /process`.
#[derive(Debug, Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    stats: Option<Value>,
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default)]
    filled_rows: Vec<u32>,
    #[serde(default)]
    missing_headers: Vec<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct GroupedHistoryResponse {
    #[serde(default)]
    history: BTreeMap<String, Vec<HistoryEntry>>,
}

#[derive(Debug, Deserialize)]
struct ActiveSessionsResponse {
    #[serde(default)]
    active_sessions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SharedProcessesResponse {
    #[serde(default)]
    processes: Vec<SharedProcessRecord>,
}

impl HttpBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.submit_timeout_secs))
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            ws_url: settings.ws_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("detail").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(BackendError::Http(detail))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::error_for_status(response).await?;

        response.json().await.map_err(|e| {
            warn!(path, error = %e, "undecodable backend response");
            BackendError::Decode(e.to_string())
        })
    }

    async fn delete(&self, path: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        Self::error_for_status(response).await?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_connect() || e.is_timeout() {
        BackendError::Unavailable(e.to_string())
    } else {
        BackendError::Http(e.to_string())
    }
}

fn count(stats: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|key| stats.get(*key).and_then(Value::as_u64))
        .unwrap_or(0)
}

/// Reads the step-specific stats object the service returns.
///
/// Steps report under different names (`total_rows`, `filled`,
/// `errors_count`); missing figures are derived the way the service does.
fn job_stats(response: &ProcessResponse) -> JobStats {
    let empty = Value::Null;
    let stats = response.stats.as_ref().unwrap_or(&empty);

    let total = count(stats, &["total", "total_rows"]);
    let success = match count(stats, &["success", "filled"]) {
        0 => response.filled_rows.len() as u64,
        n => n,
    };
    let errors = match count(stats, &["errors", "errors_count"]) {
        0 => response.errors.len() as u64,
        n => n,
    };
    let skipped = match count(stats, &["skipped"]) {
        0 => total.saturating_sub(success).saturating_sub(errors),
        n => n,
    };
    let processed = match count(stats, &["processed"]) {
        0 => success,
        n => n,
    };

    JobStats {
        total,
        success,
        errors,
        skipped,
        processed,
    }
}

fn job_outcome(response: ProcessResponse) -> Result<JobOutcome, BackendError> {
    if response.status.as_deref() == Some("error") {
        let reason = if response.missing_headers.is_empty() {
            response
                .detail
                .clone()
                .unwrap_or_else(|| "unknown error".to_string())
        } else {
            format!("missing headers: {}", response.missing_headers.join(", "))
        };
        return Err(BackendError::Rejected(reason));
    }

    let stats = job_stats(&response);
    Ok(JobOutcome {
        stats,
        filled_row_indices: response.filled_rows,
    })
}

/// Parses one text frame; frames that are not progress messages yield `None`.
fn parse_frame(text: &str) -> Option<ChannelMessage> {
    match serde_json::from_str::<ChannelMessage>(text) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!(error = %e, "skipping non-progress frame");
            None
        }
    }
}

#[async_trait]
impl EnrichmentBackend for HttpBackend {
    async fn submit_job(&self, request: JobRequest) -> Result<JobOutcome, BackendError> {
        let response = self
            .client
            .post(self.url("/process"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::error_for_status(response).await?;

        let body: ProcessResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        job_outcome(body)
    }

    async fn open_progress_channel(
        &self,
        channel_token: &str,
    ) -> Result<ChannelStream, BackendError> {
        let url = format!("{}/ws/{channel_token}", self.ws_url);
        let (mut socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| BackendError::Channel(e.to_string()))?;
        debug!(%url, "progress channel connected");

        let stream = async_stream::stream! {
            while let Some(frame) = socket.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if let Some(message) = parse_frame(&text) {
                            yield Ok(message);
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(BackendError::Channel(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn request_cancel(&self, channel_token: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url(&format!("/cancel-process/{channel_token}")))
            .send()
            .await
            .map_err(transport_error)?;
        Self::error_for_status(response).await?;
        Ok(())
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url("/history"))
            .json(&entry)
            .send()
            .await
            .map_err(transport_error)?;
        Self::error_for_status(response).await?;
        Ok(())
    }

    async fn list_history(
        &self,
        limit: u32,
        sheet_name: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, BackendError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(name) = sheet_name {
            query.push(("sheet_name", name.to_string()));
        }

        let response = self
            .client
            .get(self.url("/history"))
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::error_for_status(response).await?;

        let body: HistoryResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "undecodable history response");
            BackendError::Decode(e.to_string())
        })?;
        Ok(body.history)
    }

    async fn list_history_grouped(
        &self,
    ) -> Result<BTreeMap<String, Vec<HistoryEntry>>, BackendError> {
        let body: GroupedHistoryResponse = self.get_json("/history/grouped").await?;
        Ok(body.history)
    }

    async fn clear_history(&self) -> Result<(), BackendError> {
        self.delete("/history").await
    }

    async fn list_active_sessions(&self) -> Result<Vec<String>, BackendError> {
        let body: ActiveSessionsResponse = self.get_json("/active-sessions").await?;
        Ok(body.active_sessions)
    }

    async fn list_shared_processes(&self) -> Result<Vec<SharedProcessRecord>, BackendError> {
        let body: SharedProcessesResponse = self.get_json("/active-processes").await?;
        Ok(body.processes)
    }

    async fn save_shared_process(&self, record: SharedProcessRecord) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url("/active-processes"))
            .json(&record)
            .send()
            .await
            .map_err(transport_error)?;
        Self::error_for_status(response).await?;
        Ok(())
    }

    async fn delete_shared_process(&self, process_id: Uuid) -> Result<(), BackendError> {
        self.delete(&format!("/active-processes/{process_id}")).await
    }
}
