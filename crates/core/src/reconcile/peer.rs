//! Cross-view polling.
//!
//! Each poll reads the peer view's registry key and the discovery mailbox
//! and compares them with the local registry. The watcher only reports
//! findings; the session actor applies them.

use crate::state::process::process_from_notice;
use crate::state::registry::ProcessRegistry;
use crate::store::{read_json, KeyValueStore, Snapshot};
use chrono::Utc;
use ek_protocol::process_models::{DiscoveryNotice, Process, ViewRole, DISCOVERY_KEY};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Consecutive polls a peer-launched process may be missing from the peer
/// registry before it is treated as cancelled.
pub const VANISH_STRIKES: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum PeerFinding {
    /// The peer holds this process as terminal while it is active locally.
    Adopt(Process),
    /// A process launched in the peer view that this view has not seen.
    Discover(Process),
    /// A running peer-launched process the peer no longer holds.
    Vanished(Uuid),
    /// The peer recorded the history of a process it launched, or no longer
    /// holds it.
    HistorySettled(Uuid),
    /// A peer-launched process finished here but its history is still
    /// unwritten after `claim_after`; the peer view is not running.
    ClaimHistory(Uuid),
}

pub struct PeerWatcher {
    peer: ViewRole,
    store: Arc<dyn KeyValueStore>,
    missing_strikes: HashMap<Uuid, u8>,
    /// When each finished, still unrecorded peer-launched process was first seen.
    unrecorded_since: HashMap<Uuid, Instant>,
    claim_after: Duration,
}

impl PeerWatcher {
    /// `claim_after` is how long the launching view gets to record the
    /// history of a process that finished here.
    pub fn new(role: ViewRole, store: Arc<dyn KeyValueStore>, claim_after: Duration) -> Self {
        Self {
            peer: role.peer(),
            store,
            missing_strikes: HashMap::new(),
            unrecorded_since: HashMap::new(),
            claim_after,
        }
    }

    /// Reads the peer's state once and reports what the local view must do.
    ///
    /// An unreadable peer registry skips adoption and disappearance checks
    /// for this tick; the discovery notice is then the only source.
    pub fn poll(&mut self, local: &ProcessRegistry) -> Vec<PeerFinding> {
        let peer_registry: Option<HashMap<Uuid, Process>> =
            match read_json(self.store.as_ref(), self.peer.registry_key()) {
                Snapshot::Present(records) => Some(records),
                Snapshot::Missing => Some(HashMap::new()),
                Snapshot::Unreadable => None,
            };
        let notice: Option<DiscoveryNotice> =
            read_json(self.store.as_ref(), DISCOVERY_KEY).into_option();

        let mut findings = Vec::new();

        match &peer_registry {
            Some(records) => {
                self.compare(local, records, &mut findings);
            }
            None => {
                if let Some(notice) = notice.filter(|n| self.is_new(local, n.process_id, n.origin)) {
                    debug!(process_id = %notice.process_id, "discovered process from notice");
                    findings.push(PeerFinding::Discover(process_from_notice(&notice, Utc::now())));
                }
            }
        }

        findings
    }

    fn is_new(&self, local: &ProcessRegistry, id: Uuid, origin: ViewRole) -> bool {
        origin == self.peer && !local.contains(&id) && !local.is_tombstoned(&id)
    }

    fn compare(
        &mut self,
        local: &ProcessRegistry,
        records: &HashMap<Uuid, Process>,
        findings: &mut Vec<PeerFinding>,
    ) {
        let mut peer_records: Vec<&Process> = records.values().collect();
        peer_records.sort_by_key(|record| record.start_time);

        for record in peer_records {
            match local.get(&record.id) {
                Some(held) if held.is_active && !record.is_active => {
                    findings.push(PeerFinding::Adopt(record.clone()));
                }
                Some(_) => {}
                None if self.is_new(local, record.id, record.origin) => {
                    debug!(process_id = %record.id, "discovered process from peer registry");
                    findings.push(PeerFinding::Discover(record.clone()));
                }
                None => {}
            }
        }

        for held in local.iter() {
            if held.origin != self.peer || !held.is_active {
                continue;
            }
            if records.contains_key(&held.id) {
                self.missing_strikes.remove(&held.id);
                continue;
            }

            let strikes = self.missing_strikes.entry(held.id).or_insert(0);
            *strikes += 1;
            if *strikes >= VANISH_STRIKES {
                self.missing_strikes.remove(&held.id);
                findings.push(PeerFinding::Vanished(held.id));
            }
        }

        self.missing_strikes
            .retain(|id, _| local.get(id).is_some_and(|held| held.is_active));

        self.check_history(local, records, findings);
    }

    fn check_history(
        &mut self,
        local: &ProcessRegistry,
        records: &HashMap<Uuid, Process>,
        findings: &mut Vec<PeerFinding>,
    ) {
        let now = Instant::now();

        for held in local.iter() {
            if held.origin != self.peer || held.is_active || held.history_saved {
                continue;
            }

            let recorded = records.get(&held.id).map_or(true, |r| r.history_saved);
            if recorded {
                self.unrecorded_since.remove(&held.id);
                findings.push(PeerFinding::HistorySettled(held.id));
                continue;
            }

            match self.unrecorded_since.entry(held.id) {
                Entry::Vacant(slot) => {
                    slot.insert(now);
                }
                Entry::Occupied(slot) if now.duration_since(*slot.get()) >= self.claim_after => {
                    slot.remove();
                    debug!(process_id = %held.id, "peer never recorded history, claiming it");
                    findings.push(PeerFinding::ClaimHistory(held.id));
                }
                Entry::Occupied(_) => {}
            }
        }

        self.unrecorded_since.retain(|id, _| {
            local
                .get(id)
                .is_some_and(|held| !held.is_active && !held.history_saved)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::process::Terminal;
    use crate::store::{write_json, MemoryStore};
    use ek_protocol::process_models::{ProcessStats, StepName};

    struct Views {
        store: MemoryStore,
        home: ProcessRegistry,
        monitor: ProcessRegistry,
        watcher: PeerWatcher,
    }

    fn views() -> Views {
        let store = MemoryStore::new();
        Views {
            home: ProcessRegistry::load(ViewRole::Home, Arc::new(store.clone())),
            monitor: ProcessRegistry::load(ViewRole::Monitor, Arc::new(store.clone())),
            watcher: PeerWatcher::new(ViewRole::Monitor, Arc::new(store.clone()), Duration::ZERO),
            store,
        }
    }

    fn launch(registry: &mut ProcessRegistry) -> Process {
        registry
            .create(StepName::GenerateAiData, "Sheet".to_string(), ProcessStats::default())
            .unwrap()
    }

    #[test]
    fn test_discovers_peer_process_once() {
        let mut v = views();
        let process = launch(&mut v.home);

        let findings = v.watcher.poll(&v.monitor);
        assert_eq!(findings, vec![PeerFinding::Discover(process.clone())]);

        v.monitor.insert(process);
        assert!(v.watcher.poll(&v.monitor).is_empty());
    }

    #[test]
    fn test_ignores_own_processes_in_mailbox() {
        let mut v = views();
        launch(&mut v.monitor);

        assert!(v.watcher.poll(&v.monitor).is_empty());
    }

    #[test]
    fn test_adopts_peer_terminal_state() {
        let mut v = views();
        let process = launch(&mut v.home);
        v.monitor.insert(process.clone());

        v.home.apply_terminal(&process.id, Terminal::Completed, None);

        let findings = v.watcher.poll(&v.monitor);
        assert!(matches!(
            findings.as_slice(),
            [PeerFinding::Adopt(record)] if record.id == process.id && record.is_completed
        ));
    }

    #[test]
    fn test_falls_back_to_notice_when_registry_unreadable() {
        let mut v = views();
        let process = launch(&mut v.home);
        v.store
            .write(ViewRole::Home.registry_key(), "{\"truncated\":")
            .unwrap();

        let findings = v.watcher.poll(&v.monitor);
        assert!(matches!(
            findings.as_slice(),
            [PeerFinding::Discover(found)] if found.id == process.id && found.is_active
        ));
    }

    #[test]
    fn test_stale_notice_is_ignored() {
        let mut v = views();
        let process = launch(&mut v.home);
        v.home.remove(&process.id);
        write_json(&v.store, DISCOVERY_KEY, &DiscoveryNotice::from(&process)).unwrap();

        assert!(v.watcher.poll(&v.monitor).is_empty());
    }

    #[test]
    fn test_vanished_after_consecutive_misses() {
        let mut v = views();
        let process = launch(&mut v.home);
        v.monitor.insert(process.clone());
        v.home.remove(&process.id);

        assert!(v.watcher.poll(&v.monitor).is_empty());
        assert_eq!(
            v.watcher.poll(&v.monitor),
            vec![PeerFinding::Vanished(process.id)]
        );
    }

    #[test]
    fn test_unreadable_poll_does_not_count_as_miss() {
        let mut v = views();
        let process = launch(&mut v.home);
        v.monitor.insert(process.clone());
        v.home.remove(&process.id);

        assert!(v.watcher.poll(&v.monitor).is_empty());
        v.store
            .write(ViewRole::Home.registry_key(), "garbage")
            .unwrap();
        assert!(v.watcher.poll(&v.monitor).is_empty());
        v.store.delete(ViewRole::Home.registry_key()).unwrap();
        assert_eq!(
            v.watcher.poll(&v.monitor),
            vec![PeerFinding::Vanished(process.id)]
        );
    }

    #[test]
    fn test_peer_recorded_history_settles_latch() {
        let mut v = views();
        let process = launch(&mut v.home);
        v.monitor.insert(process.clone());

        v.home.apply_terminal(&process.id, Terminal::Completed, None);
        assert!(v.home.take_history(&process.id).is_some());
        v.monitor.apply_terminal(&process.id, Terminal::Completed, None);

        assert_eq!(
            v.watcher.poll(&v.monitor),
            vec![PeerFinding::HistorySettled(process.id)]
        );
    }

    #[test]
    fn test_claims_history_the_peer_never_wrote() {
        let mut v = views();
        let process = launch(&mut v.home);
        v.monitor.insert(process.clone());

        // The home view stopped while the job ran; only the monitor finishes it.
        v.monitor.apply_terminal(&process.id, Terminal::Completed, None);

        assert!(v.watcher.poll(&v.monitor).is_empty());
        assert_eq!(
            v.watcher.poll(&v.monitor),
            vec![PeerFinding::ClaimHistory(process.id)]
        );
    }

    #[test]
    fn test_removed_ids_are_not_rediscovered() {
        let mut v = views();
        let process = launch(&mut v.home);
        v.monitor.insert(process.clone());
        v.monitor.remove(&process.id);

        assert!(v.watcher.poll(&v.monitor).is_empty());
    }
}
