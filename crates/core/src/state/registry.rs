//! Per-view Process Registry.
//!
//! The registry is the single source of truth a view renders from. Every
//! mutation rewrites the view's registry key so the peer view can poll it,
//! and `create` also drops a notice into the shared discovery mailbox.

use crate::state::process::{self, ProgressUpdate, Terminal};
use crate::store::{read_json, write_json, KeyValueStore, StoreResult};
use chrono::Utc;
use ek_protocol::job_models::{HistoryEntry, JobOutcome};
use ek_protocol::process_models::{
    DiscoveryNotice, Process, ProcessStats, StepName, ViewRole, DISCOVERY_KEY,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a submission result changed a process.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeApplied {
    /// The process was active and is now completed.
    Completed(Process),
    /// The process had already completed; final stats were refreshed.
    Refreshed(Process),
    /// The process is gone, cancelled or failed.
    Ignored,
}

pub struct ProcessRegistry {
    role: ViewRole,
    store: Arc<dyn KeyValueStore>,
    processes: HashMap<Uuid, Process>,
    /// Ids removed from this view; never admitted again.
    tombstones: HashSet<Uuid>,
}

impl ProcessRegistry {
    /// Restores the registry persisted under the view's key.
    ///
    /// A missing or undecodable key yields an empty registry.
    pub fn load(role: ViewRole, store: Arc<dyn KeyValueStore>) -> Self {
        let processes: HashMap<Uuid, Process> = read_json(store.as_ref(), role.registry_key())
            .into_option()
            .unwrap_or_default();

        debug!(view = %role, restored = processes.len(), "loaded process registry");

        Self {
            role,
            store,
            processes,
            tombstones: HashSet::new(),
        }
    }

    pub fn role(&self) -> ViewRole {
        self.role
    }

    pub fn get(&self, id: &Uuid) -> Option<&Process> {
        self.processes.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.processes.contains_key(id)
    }

    pub fn is_tombstoned(&self, id: &Uuid) -> bool {
        self.tombstones.contains(id)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// All processes, oldest first.
    pub fn all(&self) -> Vec<Process> {
        let mut processes: Vec<Process> = self.processes.values().cloned().collect();
        processes.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        processes
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    /// Create, persist and announce a new process launched from this view.
    pub fn create(
        &mut self,
        step_name: StepName,
        sheet_name: String,
        initial_stats: ProcessStats,
    ) -> StoreResult<Process> {
        let process = process::create_process(self.role, step_name, sheet_name, initial_stats);
        self.processes.insert(process.id, process.clone());

        if let Err(e) = self
            .persist()
            .and_then(|()| self.publish_discovery(&process))
        {
            self.processes.remove(&process.id);
            self.save();
            return Err(e);
        }

        info!(
            view = %self.role,
            process_id = %process.id,
            step = %process.step_name,
            "process created"
        );
        Ok(process)
    }

    /// Admit a process record built elsewhere.
    ///
    /// Returns `false` (and changes nothing) when the id is already held in
    /// any state or was removed from this view.
    pub fn insert(&mut self, process: Process) -> bool {
        if self.processes.contains_key(&process.id) {
            warn!(view = %self.role, process_id = %process.id, "ignoring duplicate process");
            return false;
        }
        if self.tombstones.contains(&process.id) {
            debug!(view = %self.role, process_id = %process.id, "ignoring removed process");
            return false;
        }

        self.processes.insert(process.id, process);
        self.save();
        true
    }

    pub fn apply_progress(&mut self, id: &Uuid, reported: &ProcessStats) -> ProgressUpdate {
        let Some(process) = self.processes.get_mut(id) else {
            return ProgressUpdate::Ignored;
        };

        let update = process::apply_progress(process, reported);
        if matches!(update, ProgressUpdate::Applied { .. }) {
            self.save();
        }
        update
    }

    /// Returns the finished record when this call made the transition.
    pub fn apply_terminal(
        &mut self,
        id: &Uuid,
        terminal: Terminal,
        final_stats: Option<&ProcessStats>,
    ) -> Option<Process> {
        let process = self.processes.get_mut(id)?;

        if !process::apply_terminal(process, terminal, final_stats, Utc::now()) {
            return None;
        }

        let finished = process.clone();
        info!(
            view = %self.role,
            process_id = %id,
            status = ?finished.status(),
            "process finished"
        );
        self.save();
        Some(finished)
    }

    /// Operator override for a process whose terminal signal never arrived.
    pub fn mark_completed_manually(&mut self, id: &Uuid) -> Option<Process> {
        self.apply_terminal(id, Terminal::Completed, None)
    }

    /// Take over a terminal state the peer view already reached.
    pub fn adopt_terminal(&mut self, peer: &Process) -> Option<Process> {
        let local = self.processes.get_mut(&peer.id)?;

        if !process::adopt_terminal(local, peer) {
            return None;
        }

        let adopted = local.clone();
        debug!(view = %self.role, process_id = %peer.id, "adopted terminal state from peer");
        self.save();
        Some(adopted)
    }

    /// Apply the synchronous submission result.
    pub fn apply_job_outcome(&mut self, id: &Uuid, outcome: &JobOutcome) -> OutcomeApplied {
        let Some(process) = self.processes.get_mut(id) else {
            return OutcomeApplied::Ignored;
        };

        let stats = ProcessStats::from(&outcome.stats);
        let applied = if process.is_active {
            process::apply_terminal(process, Terminal::Completed, Some(&stats), Utc::now());
            process.filled_row_indices = outcome.filled_row_indices.clone();
            OutcomeApplied::Completed(process.clone())
        } else if process.is_completed {
            process::merge_counts(&mut process.stats, &stats);
            process.filled_row_indices = outcome.filled_row_indices.clone();
            OutcomeApplied::Refreshed(process.clone())
        } else {
            return OutcomeApplied::Ignored;
        };

        self.save();
        applied
    }

    /// Advance the elapsed-time counter.
    ///
    /// Ticks are not persisted; the final elapsed value is written with the
    /// terminal transition.
    pub fn tick(&mut self, id: &Uuid) -> Option<Process> {
        let process = self.processes.get_mut(id)?;
        if process::tick(process, Utc::now()) {
            Some(process.clone())
        } else {
            None
        }
    }

    /// Claims the one-shot history write for a terminal process.
    ///
    /// Only the view that launched the process writes its history here; the
    /// peer view takes over through [`Self::claim_history`].
    pub fn take_history(&mut self, id: &Uuid) -> Option<HistoryEntry> {
        let launched_here = self.get(id).is_some_and(|p| p.origin == self.role);
        if !launched_here {
            return None;
        }
        self.claim_history(id)
    }

    /// Claims the history write regardless of which view launched the process.
    pub fn claim_history(&mut self, id: &Uuid) -> Option<HistoryEntry> {
        let process = self.processes.get_mut(id)?;

        if process.history_saved || process.is_active {
            return None;
        }

        let entry = process::history_entry(process, Utc::now())?;
        process.history_saved = true;
        self.save();
        Some(entry)
    }

    /// Close the history latch of a process the peer view already recorded.
    pub fn mark_history_saved(&mut self, id: &Uuid) -> bool {
        match self.processes.get_mut(id) {
            Some(process) if !process.history_saved => {
                process.history_saved = true;
                self.save();
                true
            }
            _ => false,
        }
    }

    /// Delete a process and keep it out of this view for good.
    pub fn remove(&mut self, id: &Uuid) -> Option<Process> {
        self.tombstones.insert(*id);
        let removed = self.processes.remove(id);
        if removed.is_some() {
            info!(view = %self.role, process_id = %id, "process removed");
            self.save();
        }
        removed
    }

    /// Write the full registry, or evict the key once it is empty.
    pub fn persist(&self) -> StoreResult<()> {
        let key = self.role.registry_key();
        if self.processes.is_empty() {
            self.store.delete(key)
        } else {
            write_json(self.store.as_ref(), key, &self.processes)
        }
    }

    /// Persists after a mutation; a failed write is retried by the next one.
    fn save(&self) {
        if let Err(e) = self.persist() {
            warn!(view = %self.role, error = %e, "failed to persist process registry");
        }
    }

    fn publish_discovery(&self, process: &Process) -> StoreResult<()> {
        write_json(
            self.store.as_ref(),
            DISCOVERY_KEY,
            &DiscoveryNotice::from(process),
        )
    }
}
