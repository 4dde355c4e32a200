//! Handle for driving a mounted view session.
//!
//! A [`SessionHandle`] is what a front-end holds after
//! [`ViewSession::mount`](crate::engine::ViewSession::mount). Every call is a
//! message to the session actor; replies come back over a oneshot channel,
//! so the handle is cheap to clone and safe to share between tasks.

use crate::engine::Command;
use crate::store::StoreError;
use ek_protocol::ipc::Op;
use ek_protocol::process_models::{Process, ProcessStats, StepName, ViewRole};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Process {0} not found")]
    NotFound(Uuid),

    #[error("Process {0} was launched from the other view and can only be cancelled there")]
    NotInitiator(Uuid),

    #[error("View session is no longer running")]
    SessionClosed,

    #[error("Failed to persist process registry: {0}")]
    Store(#[from] StoreError),
}

/// Everything needed to launch one enrichment step.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub sheet_id: String,
    pub step: StepName,
    /// Display name; defaults to the sheet id.
    pub sheet_name: Option<String>,
    /// Replaces the configured prompt for this run only.
    pub prompt_override: Option<String>,
    pub initial_stats: ProcessStats,
}

impl JobSpec {
    pub fn new(sheet_id: impl Into<String>, step: StepName) -> Self {
        Self {
            sheet_id: sheet_id.into(),
            step,
            sheet_name: None,
            prompt_override: None,
            initial_stats: ProcessStats::default(),
        }
    }

    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = Some(name.into());
        self
    }

    pub fn prompt_override(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_override = Some(prompt.into());
        self
    }

    pub fn initial_stats(mut self, stats: ProcessStats) -> Self {
        self.initial_stats = stats;
        self
    }
}

#[derive(Clone)]
pub struct SessionHandle {
    role: ViewRole,
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    pub(crate) fn new(role: ViewRole, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { role, commands }
    }

    pub fn role(&self) -> ViewRole {
        self.role
    }

    /// Launch a job from this view.
    ///
    /// The process is registered and announced before the submission is
    /// sent, so it shows up immediately even though the backend call can
    /// take minutes.
    ///
    /// # Returns
    ///
    /// The newly created process, already persisted.
    pub async fn launch(&self, spec: JobSpec) -> Result<Process, SessionError> {
        self.request(|reply| Command::Launch { spec, reply })
            .await?
    }

    /// Cancel a process this view launched, then drop it from the registry.
    ///
    /// # Errors
    ///
    /// `NotInitiator` if the process was launched from the other view.
    pub async fn cancel(&self, id: Uuid) -> Result<(), SessionError> {
        self.request(|reply| Command::Cancel { id, reply }).await?
    }

    /// Drop a process from this view without contacting the backend.
    pub async fn remove(&self, id: Uuid) -> Result<(), SessionError> {
        self.request(|reply| Command::Remove { id, reply }).await?
    }

    /// Force a process to completed. A process that is already terminal is
    /// returned unchanged.
    pub async fn mark_completed(&self, id: Uuid) -> Result<Process, SessionError> {
        self.request(|reply| Command::MarkCompleted { id, reply })
            .await?
    }

    pub async fn get_process(&self, id: Uuid) -> Result<Option<Process>, SessionError> {
        self.request(|reply| Command::Get { id, reply }).await
    }

    /// All processes, oldest first.
    pub async fn get_all_processes(&self) -> Result<Vec<Process>, SessionError> {
        self.request(|reply| Command::List { reply }).await
    }

    pub async fn process_count(&self) -> Result<usize, SessionError> {
        Ok(self.get_all_processes().await?.len())
    }

    /// Forward a front-end operation. Failures surface as
    /// `Event::Notification` on the event channel.
    pub fn apply_op(&self, op: Op) -> Result<(), SessionError> {
        self.commands
            .send(Command::ApplyOp { op })
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Unmount the view and wait until every channel and timer is closed.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| SessionError::SessionClosed)?;
        response.await.map_err(|_| SessionError::SessionClosed)
    }
}
