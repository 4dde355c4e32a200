//! Backend calls the session runs in the background.
//!
//! The job submission is abortable and reports back through the session's
//! input channel. Cancellation requests, history writes and shared-record
//! mirroring are fire-and-forget; their failures are only logged.

use crate::backend::EnrichmentBackend;
use crate::engine::SessionInput;
use ek_protocol::job_models::{HistoryEntry, JobRequest, SharedProcessRecord};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Runs `submit_job` for process `id`; abort the handle to drop the request.
pub fn spawn_submission(
    backend: Arc<dyn EnrichmentBackend>,
    request: JobRequest,
    id: Uuid,
    inputs: UnboundedSender<SessionInput>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(process_id = %id, step = %request.step, sheet = %request.sheet_id, "submitting job");
        let result = backend.submit_job(request).await;
        let _ = inputs.send(SessionInput::SubmissionFinished { id, result });
    })
}

pub fn spawn_cancel_request(backend: Arc<dyn EnrichmentBackend>, channel_token: String) {
    tokio::spawn(async move {
        if let Err(e) = backend.request_cancel(&channel_token).await {
            warn!(channel = %channel_token, error = %e, "cancellation request failed");
        }
    });
}

pub fn spawn_history_write(backend: Arc<dyn EnrichmentBackend>, entry: HistoryEntry) {
    tokio::spawn(async move {
        if let Err(e) = backend.append_history(entry).await {
            warn!(error = %e, "failed to save history entry");
        }
    });
}

enum MirrorWrite {
    Save(SharedProcessRecord),
    Delete(Uuid),
}

/// Copies this view's process records to the backend's shared list.
///
/// Writes go through one task so the backend sees them in the order the
/// session made them. The task ends once the mirror is dropped.
pub struct SharedMirror {
    writes: UnboundedSender<MirrorWrite>,
}

impl SharedMirror {
    pub fn spawn(backend: Arc<dyn EnrichmentBackend>) -> Self {
        let (writes, mut pending) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(write) = pending.recv().await {
                let (id, result) = match write {
                    MirrorWrite::Save(record) => {
                        (record.process_id, backend.save_shared_process(record).await)
                    }
                    MirrorWrite::Delete(id) => (id, backend.delete_shared_process(id).await),
                };
                if let Err(e) = result {
                    warn!(process_id = %id, error = %e, "failed to mirror process record");
                }
            }
        });
        Self { writes }
    }

    pub fn save(&self, record: SharedProcessRecord) {
        let _ = self.writes.send(MirrorWrite::Save(record));
    }

    pub fn delete(&self, id: Uuid) {
        let _ = self.writes.send(MirrorWrite::Delete(id));
    }
}
