//! View session engine.
//!
//! A `ViewSession` is the context object one view (Home or Monitor) owns
//! for its whole lifetime. It runs as a single actor task: operator
//! commands, channel messages, ticker ticks, grace-period expiries,
//! submission results and poll ticks are all folded into the Process
//! Registry by this one task, so mutations for a process id never race.

pub mod submission;

use crate::backend::{BackendError, EnrichmentBackend};
use crate::channel::ChannelAdapter;
use crate::config::models::SessionSettings;
use crate::reconcile::{GraceTimers, PeerFinding, PeerWatcher};
use crate::state::manager::{JobSpec, SessionError, SessionHandle};
use crate::state::process::{self, ProgressUpdate, Terminal};
use crate::state::registry::{OutcomeApplied, ProcessRegistry};
use crate::store::KeyValueStore;
use ek_protocol::channel_models::{ChannelMessage, ChannelMessageKind};
use ek_protocol::ipc::{Event, Op};
use ek_protocol::job_models::{JobOutcome, JobRequest, SharedProcessRecord};
use ek_protocol::process_models::{Process, ProcessStats, ViewRole};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Inputs produced by the session's own background tasks.
#[derive(Debug)]
pub enum SessionInput {
    /// A message arrived on the progress channel of `id`.
    Channel { id: Uuid, message: ChannelMessage },
    /// The connection opened as `generation` for `id` ended.
    ChannelClosed { id: Uuid, generation: u64 },
    Tick { id: Uuid },
    GraceExpired { id: Uuid },
    SubmissionFinished {
        id: Uuid,
        result: Result<JobOutcome, BackendError>,
    },
}

/// Requests sent by a [`SessionHandle`].
pub(crate) enum Command {
    Launch {
        spec: JobSpec,
        reply: oneshot::Sender<Result<Process, SessionError>>,
    },
    Cancel {
        id: Uuid,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Remove {
        id: Uuid,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    MarkCompleted {
        id: Uuid,
        reply: oneshot::Sender<Result<Process, SessionError>>,
    },
    Get {
        id: Uuid,
        reply: oneshot::Sender<Option<Process>>,
    },
    List {
        reply: oneshot::Sender<Vec<Process>>,
    },
    ApplyOp {
        op: Op,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub struct ViewSession {
    role: ViewRole,
    settings: SessionSettings,
    backend: Arc<dyn EnrichmentBackend>,
    registry: ProcessRegistry,
    channels: ChannelAdapter,
    grace: GraceTimers,
    peer: PeerWatcher,
    submissions: HashMap<Uuid, JoinHandle<()>>,
    mirror: submission::SharedMirror,
    inputs: UnboundedSender<SessionInput>,
    events: UnboundedSender<Event>,
}

impl ViewSession {
    /// Mount a view: restore its registry and start the session actor.
    ///
    /// Restored processes that are still active get their channel and
    /// ticker back. Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `role` - Which view this session backs
    /// * `settings` - Timers and prompt overrides
    /// * `backend` - The enrichment backend
    /// * `store` - Durable storage shared with the peer view
    /// * `events` - Channel for sending events to the front-end
    pub fn mount(
        role: ViewRole,
        settings: SessionSettings,
        backend: Arc<dyn EnrichmentBackend>,
        store: Arc<dyn KeyValueStore>,
        events: UnboundedSender<Event>,
    ) -> SessionHandle {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let mut session = Self {
            role,
            registry: ProcessRegistry::load(role, Arc::clone(&store)),
            channels: ChannelAdapter::new(
                Arc::clone(&backend),
                inputs_tx.clone(),
                settings.ticker_interval,
            ),
            grace: GraceTimers::new(settings.grace_period, inputs_tx.clone()),
            peer: PeerWatcher::new(
                role,
                store,
                settings.grace_period + settings.poll_interval * 2,
            ),
            submissions: HashMap::new(),
            mirror: submission::SharedMirror::spawn(Arc::clone(&backend)),
            inputs: inputs_tx,
            backend,
            settings,
            events,
        };
        session.resume_restored();

        tokio::spawn(session.run(commands_rx, inputs_rx));
        SessionHandle::new(role, commands_tx)
    }

    async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command>,
        mut inputs: UnboundedReceiver<SessionInput>,
    ) {
        info!(view = %self.role, processes = self.registry.len(), "view session mounted");
        self.emit(Event::DashboardState {
            processes: self.registry.all(),
        });

        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if let ControlFlow::Break(reply) = self.handle_command(command) {
                        self.unmount();
                        if let Some(reply) = reply {
                            let _ = reply.send(());
                        }
                        return;
                    }
                }
                Some(input) = inputs.recv() => self.handle_input(input),
                _ = poll.tick() => self.poll_peer(),
            }
        }

        self.unmount();
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<Option<oneshot::Sender<()>>> {
        match command {
            Command::Launch { spec, reply } => {
                let _ = reply.send(self.launch(spec));
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(id));
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.remove(id));
            }
            Command::MarkCompleted { id, reply } => {
                let _ = reply.send(self.mark_completed(id));
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.registry.get(&id).cloned());
            }
            Command::List { reply } => {
                let _ = reply.send(self.registry.all());
            }
            Command::ApplyOp { op } => {
                if self.apply_op(op).is_break() {
                    return ControlFlow::Break(None);
                }
            }
            Command::Shutdown { reply } => return ControlFlow::Break(Some(reply)),
        }
        ControlFlow::Continue(())
    }

    fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Channel { id, message } => self.on_channel_message(id, message),
            SessionInput::ChannelClosed { id, generation } => {
                if self.channels.on_closed(id, generation) {
                    debug!(process_id = %id, "progress channel dropped");
                }
            }
            SessionInput::Tick { id } => {
                if let Some(process) = self.registry.tick(&id) {
                    self.emit(Event::ProcessUpdated { process });
                }
            }
            SessionInput::GraceExpired { id } => self.on_grace_expired(id),
            SessionInput::SubmissionFinished { id, result } => {
                self.on_submission_finished(id, result);
            }
        }
    }

    fn launch(&mut self, spec: JobSpec) -> Result<Process, SessionError> {
        let sheet_name = spec
            .sheet_name
            .clone()
            .unwrap_or_else(|| spec.sheet_id.clone());
        let process = self
            .registry
            .create(spec.step, sheet_name, spec.initial_stats)?;

        self.emit(Event::ProcessStarted {
            process: process.clone(),
        });
        self.mirror.save(SharedProcessRecord::from(&process));
        self.track(&process);

        let custom_prompt = spec
            .prompt_override
            .or_else(|| self.settings.prompt_for(spec.step).map(str::to_string));
        let request = JobRequest {
            sheet_id: spec.sheet_id,
            step: spec.step,
            sheet_name: spec.sheet_name,
            session_id: process.channel_token.clone(),
            custom_prompt,
        };
        let task = submission::spawn_submission(
            Arc::clone(&self.backend),
            request,
            process.id,
            self.inputs.clone(),
        );
        self.submissions.insert(process.id, task);

        Ok(process)
    }

    fn cancel(&mut self, id: Uuid) -> Result<(), SessionError> {
        let process = self
            .registry
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))?;
        if process.origin != self.role {
            return Err(SessionError::NotInitiator(id));
        }

        self.release(&id);

        if process.is_active {
            submission::spawn_cancel_request(Arc::clone(&self.backend), process.channel_token);
            self.registry.apply_terminal(&id, Terminal::Cancelled, None);
            self.write_history(&id);
            self.emit(Event::ProcessCancelled { process_id: id });
        }

        self.registry.remove(&id);
        self.mirror.delete(id);
        self.emit(Event::ProcessRemoved { process_id: id });
        info!(view = %self.role, process_id = %id, "process cancelled");
        Ok(())
    }

    fn remove(&mut self, id: Uuid) -> Result<(), SessionError> {
        let removed = self
            .registry
            .remove(&id)
            .ok_or(SessionError::NotFound(id))?;
        self.release(&id);
        // The peer's copy stays listed until its launching view drops it.
        if removed.origin == self.role {
            self.mirror.delete(id);
        }
        self.emit(Event::ProcessRemoved { process_id: id });
        Ok(())
    }

    fn mark_completed(&mut self, id: Uuid) -> Result<Process, SessionError> {
        if let Some(process) = self.registry.mark_completed_manually(&id) {
            info!(view = %self.role, process_id = %id, "process marked completed by operator");
            self.settle(&process);
            return Ok(process);
        }

        self.registry
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    fn apply_op(&mut self, op: Op) -> ControlFlow<()> {
        let result = match op {
            Op::LaunchJob {
                sheet_id,
                step,
                sheet_name,
                prompt_override,
            } => {
                let spec = JobSpec {
                    sheet_id,
                    step,
                    sheet_name,
                    prompt_override,
                    initial_stats: ProcessStats::default(),
                };
                self.launch(spec).map(|_| ())
            }
            Op::CancelProcess { process_id } => self.cancel(process_id),
            Op::RemoveProcess { process_id } => self.remove(process_id),
            Op::MarkCompleted { process_id } => self.mark_completed(process_id).map(|_| ()),
            Op::GetDashboardState => {
                self.emit(Event::DashboardState {
                    processes: self.registry.all(),
                });
                Ok(())
            }
            Op::Shutdown => return ControlFlow::Break(()),
        };

        if let Err(e) = result {
            warn!(view = %self.role, error = %e, "operation rejected");
            self.emit(Event::Notification {
                message: e.to_string(),
            });
        }
        ControlFlow::Continue(())
    }

    fn on_channel_message(&mut self, id: Uuid, message: ChannelMessage) {
        let Some(process) = self.registry.get(&id) else {
            return;
        };
        if !process.is_active {
            debug!(process_id = %id, kind = ?message.kind, "ignoring message for finished process");
            return;
        }
        let step = process.step_name;

        match message.kind {
            ChannelMessageKind::Progress => {
                let update = self.registry.apply_progress(&id, &message.counts());
                if let ProgressUpdate::Applied { reached_full, .. } = update {
                    if reached_full && self.grace.arm(id) {
                        debug!(process_id = %id, "progress reached 100%, grace period started");
                    }
                    if let Some(process) = self.registry.get(&id).cloned() {
                        self.emit(Event::ProcessUpdated { process });
                    }
                }
            }
            ChannelMessageKind::Complete => {
                let counts = (message.total > 0).then(|| message.counts());
                self.finish(id, Terminal::Completed, counts.as_ref());
            }
            ChannelMessageKind::Cancelled => self.finish(id, Terminal::Cancelled, None),
            ChannelMessageKind::Error => {
                let error = message
                    .message
                    .unwrap_or_else(|| "backend reported an error".to_string());
                self.emit(Event::Notification {
                    message: format!("{step}: {error}"),
                });
                self.finish(id, Terminal::Failed(error), None);
            }
        }
    }

    fn on_grace_expired(&mut self, id: Uuid) {
        if !self.grace.fired(&id) {
            return;
        }
        if self.registry.get(&id).is_some_and(|p| p.is_active) {
            info!(process_id = %id, "no terminal message within grace period, completing");
            self.finish(id, Terminal::Completed, None);
        }
    }

    fn on_submission_finished(&mut self, id: Uuid, result: Result<JobOutcome, BackendError>) {
        self.submissions.remove(&id);

        match result {
            Ok(outcome) => match self.registry.apply_job_outcome(&id, &outcome) {
                OutcomeApplied::Completed(process) => self.settle(&process),
                OutcomeApplied::Refreshed(process) => {
                    self.emit(Event::ProcessUpdated { process });
                }
                OutcomeApplied::Ignored => {
                    debug!(process_id = %id, "submission result for inactive process ignored");
                }
            },
            Err(e) => {
                let Some(step) = self
                    .registry
                    .get(&id)
                    .filter(|p| p.is_active)
                    .map(|p| p.step_name)
                else {
                    debug!(process_id = %id, error = %e, "late submission failure ignored");
                    return;
                };

                warn!(process_id = %id, error = %e, "job submission failed");
                self.emit(Event::Notification {
                    message: format!("{step} failed: {e}"),
                });
                self.finish(id, Terminal::Failed(e.to_string()), None);
            }
        }
    }

    fn poll_peer(&mut self) {
        for finding in self.peer.poll(&self.registry) {
            match finding {
                PeerFinding::Adopt(record) => {
                    if let Some(process) = self.registry.adopt_terminal(&record) {
                        self.settle(&process);
                    }
                }
                PeerFinding::Discover(record) => {
                    if self.registry.insert(record.clone()) {
                        info!(view = %self.role, process_id = %record.id, "discovered process");
                        if record.is_active {
                            self.track(&record);
                        }
                        self.emit(Event::ProcessDiscovered { process: record });
                    }
                }
                PeerFinding::Vanished(id) => {
                    info!(view = %self.role, process_id = %id, "process left the peer view");
                    self.finish(id, Terminal::Cancelled, None);
                }
                PeerFinding::HistorySettled(id) => {
                    self.registry.mark_history_saved(&id);
                }
                PeerFinding::ClaimHistory(id) => {
                    if let Some(entry) = self.registry.claim_history(&id) {
                        info!(view = %self.role, process_id = %id, "recording history for the launching view");
                        submission::spawn_history_write(Arc::clone(&self.backend), entry);
                        if let Some(process) = self.registry.get(&id) {
                            self.mirror.save(SharedProcessRecord::from(process));
                        }
                    }
                }
            }
        }

        self.reconnect_dropped();
    }

    /// Opens the channel and ticker of an active process.
    fn track(&mut self, process: &Process) {
        self.channels.open(process.id, &process.channel_token);
        self.channels.start_ticker(process.id);
        if process.progress >= 100.0 {
            self.grace.arm(process.id);
        }
    }

    fn resume_restored(&mut self) {
        let active: Vec<Process> = self
            .registry
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        for process in &active {
            self.track(process);
        }
    }

    fn reconnect_dropped(&mut self) {
        let dropped: Vec<(Uuid, String)> = self
            .registry
            .iter()
            .filter(|p| p.is_active && !self.channels.is_open(&p.id))
            .map(|p| (p.id, p.channel_token.clone()))
            .collect();
        for (id, token) in dropped {
            if self.channels.reopen_if_due(id, &token) {
                debug!(process_id = %id, "reconnecting progress channel");
            }
        }
    }

    fn finish(&mut self, id: Uuid, terminal: Terminal, final_stats: Option<&ProcessStats>) {
        if let Some(process) = self.registry.apply_terminal(&id, terminal, final_stats) {
            self.settle(&process);
        }
    }

    /// Releases the live resources of a process that just became terminal,
    /// announces it and claims its history write.
    ///
    /// Only the launching view mirrors the terminal record.
    fn settle(&mut self, process: &Process) {
        self.grace.cancel(&process.id);
        self.channels.release(&process.id);
        if let Some(event) = process::terminal_event(process) {
            self.emit(event);
        }
        if process.origin == self.role {
            self.mirror.save(SharedProcessRecord::from(process));
        }
        self.write_history(&process.id);
    }

    /// Aborts everything running on behalf of `id`.
    fn release(&mut self, id: &Uuid) {
        if let Some(task) = self.submissions.remove(id) {
            task.abort();
        }
        self.grace.cancel(id);
        self.channels.release(id);
    }

    fn write_history(&mut self, id: &Uuid) {
        if let Some(entry) = self.registry.take_history(id) {
            submission::spawn_history_write(Arc::clone(&self.backend), entry);
        }
    }

    fn unmount(&mut self) {
        for (_, task) in self.submissions.drain() {
            task.abort();
        }
        self.channels.shutdown();
        self.grace.shutdown();
        info!(view = %self.role, "view session unmounted");
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}
