//! The lifecycle engine: one reconciliation cycle plus the read-only query surface.
//!
//! The polling context is the only caller of [`Engine::run_cycle`]; everything else
//! only reads. A cycle applies its whole diff under the live-table lock and publishes
//! events after releasing it, so subscribers never see half a cycle.

use crate::collectors::{ProcessFilter, ProcessSource, SampleError, SysinfoSource};
use crate::config::MonitorConfig;
use crate::events::{EventKind, MonitorEvent};
use crate::lifecycle::{LifecycleReconciler, LifespanRecord, TrackedProcess};
use crate::stats::Statistics;
use crate::storage::{HistoryStore, StoreError};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("sampling failed ({consecutive} in a row): {source}")]
    Sample {
        #[source]
        source: SampleError,
        consecutive: u32,
    },
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub started: usize,
    pub ended: usize,
    pub tracked: usize,
    pub skipped_entries: usize,
    pub persisted: bool,
    /// The session was stopped while this cycle was sampling; nothing was applied
    pub discarded: bool,
}

struct LiveState {
    reconciler: LifecycleReconciler,
    active: bool,
    epoch: u64,
    consecutive_failures: u32,
}

pub struct Engine {
    source: Box<dyn ProcessSource>,
    live: Mutex<LiveState>,
    store: HistoryStore,
    events: broadcast::Sender<MonitorEvent>,
    persist_batch: usize,
}

impl Engine {
    pub fn new(config: &MonitorConfig, source: Box<dyn ProcessSource>, store: HistoryStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            live: Mutex::new(LiveState {
                reconciler: LifecycleReconciler::new(),
                active: true,
                epoch: 0,
                consecutive_failures: 0,
            }),
            store,
            events,
            persist_batch: config.persist.batch_records.max(1),
        }
    }

    /// Engine over the real process table and the configured history file.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, StoreError> {
        let store = HistoryStore::open(config.history_path())?;
        let source = SysinfoSource::new(ProcessFilter::new(&config.sampler));
        Ok(Self::new(config, Box::new(source), store))
    }

    /// Sample, reconcile, record ended lifespans, persist if due, publish events.
    ///
    /// A failed sample leaves all state untouched.
    pub fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let epoch = self.lock_live().epoch;

        let snapshot = match self.source.sample() {
            Ok(snapshot) => snapshot,
            Err(source) => {
                let mut live = self.lock_live();
                live.consecutive_failures += 1;
                return Err(CycleError::Sample {
                    source,
                    consecutive: live.consecutive_failures,
                });
            }
        };
        let now = Utc::now();

        let (transitions, tracked) = {
            let mut live = self.lock_live();
            if !live.active || live.epoch != epoch {
                debug!(epoch, "session ended while sampling, dropping cycle");
                return Ok(CycleReport {
                    discarded: true,
                    ..CycleReport::default()
                });
            }
            live.consecutive_failures = 0;
            let transitions = live.reconciler.reconcile(&snapshot, now);
            if !transitions.ended.is_empty() {
                self.store.append_all(transitions.ended.iter().cloned());
            }
            (transitions, live.reconciler.len())
        };

        let mut persisted = false;
        if self.store.pending() >= self.persist_batch {
            match self.store.persist() {
                Ok(()) => persisted = true,
                Err(e) => warn!(error = %e, pending = self.store.pending(), "history persist failed, will retry"),
            }
        }

        let report = CycleReport {
            started: transitions.started.len(),
            ended: transitions.ended.len(),
            tracked,
            skipped_entries: snapshot.skipped(),
            persisted,
            discarded: false,
        };

        for started in transitions.started {
            info!(name = %started.name, pid = started.pid, "process started");
            let _ = self.events.send(MonitorEvent::new(EventKind::Started(started), now));
        }
        for ended in transitions.ended {
            info!(
                name = %ended.name,
                pid = ended.pid,
                duration_secs = ended.duration_seconds,
                "process ended"
            );
            let _ = self.events.send(MonitorEvent::new(EventKind::Ended(ended), now));
        }

        Ok(report)
    }

    /// Open a new session: the live table starts empty and cycles sampled under an
    /// earlier session are ignored.
    pub fn begin_session(&self) {
        let mut live = self.lock_live();
        live.epoch += 1;
        live.active = true;
        live.consecutive_failures = 0;
        live.reconciler.clear();
    }

    /// Close the session: discard still-running processes (no records are made for
    /// them) and flush history.
    pub fn end_session(&self) -> Result<(), StoreError> {
        let discarded = {
            let mut live = self.lock_live();
            live.active = false;
            let n = live.reconciler.len();
            live.reconciler.clear();
            n
        };
        debug!(discarded, "live table cleared");
        self.store.persist()
    }

    pub fn is_active(&self) -> bool {
        self.lock_live().active
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn current_tracked(&self) -> Vec<TrackedProcess> {
        self.lock_live().reconciler.tracked()
    }

    /// Most recent `limit` lifespans, oldest first.
    pub fn history(&self, limit: usize) -> Vec<LifespanRecord> {
        self.store.recent(limit)
    }

    pub fn statistics(&self) -> Statistics {
        self.store.with_records(Statistics::from_records)
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    fn lock_live(&self) -> MutexGuard<'_, LiveState> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
