//! Process table sampling: one point-in-time snapshot keyed by process name.
//!
//! A process is identified by its name, not its PID. Two processes running at the
//! same time under the same name collapse into one entry (the lowest PID wins), so
//! they cannot be told apart. This is a known limitation of name-keyed tracking.

mod process;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::config::SamplerConfig;

pub use process::SysinfoSource;

/// Whole-sample failure. The cycle is aborted and retried on the next tick.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("process enumeration is not supported on this platform")]
    Unsupported,
    #[error("sampler state poisoned by an earlier panic")]
    Poisoned,
    #[error("process enumeration failed: {0}")]
    Os(String),
}

/// Failure for a single process table entry. The entry is skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("process {pid} vanished during sampling")]
    Vanished { pid: u32 },
    #[error("access to process {pid} denied")]
    AccessDenied { pid: u32 },
    #[error("process {pid} did not respond")]
    Unresponsive { pid: u32 },
}

/// One raw row from the OS process table, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProcess {
    pub pid: u32,
    pub name: Option<String>,
    pub os_create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessObservation {
    pub pid: u32,
    pub os_create_time: Option<DateTime<Utc>>,
}

/// Exclusion rules applied while building a snapshot.
#[derive(Debug, Clone)]
pub struct ProcessFilter {
    exclude_prefixes: Vec<String>,
    min_pid: u32,
}

impl ProcessFilter {
    pub fn new(config: &SamplerConfig) -> Self {
        Self {
            exclude_prefixes: config.exclude_prefixes.clone(),
            min_pid: config.min_pid.max(1),
        }
    }

    /// Returns the identity to track, or None when the process is excluded.
    pub fn admit<'a>(&self, process: &'a RawProcess) -> Option<&'a str> {
        let name = process.name.as_deref()?;
        if name.is_empty() || process.pid < self.min_pid {
            return None;
        }
        if self.exclude_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            return None;
        }
        Some(name)
    }
}

impl Default for ProcessFilter {
    fn default() -> Self {
        Self::new(&SamplerConfig::default())
    }
}

/// Point-in-time mapping identity → observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    processes: BTreeMap<String, ProcessObservation>,
    skipped: usize,
}

impl Snapshot {
    /// Build from raw rows. Failed rows are counted and skipped, never fatal.
    pub fn from_entries<I>(entries: I, filter: &ProcessFilter) -> Self
    where
        I: IntoIterator<Item = Result<RawProcess, EntryError>>,
    {
        let mut snapshot = Snapshot::default();
        for entry in entries {
            let raw = match entry {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(error = %e, "skipping process entry");
                    snapshot.skipped += 1;
                    continue;
                }
            };
            let Some(name) = filter.admit(&raw) else {
                continue;
            };
            let observation = ProcessObservation {
                pid: raw.pid,
                os_create_time: raw.os_create_time,
            };
            match snapshot.processes.entry(name.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(observation);
                }
                Entry::Occupied(mut slot) => {
                    if observation.pid < slot.get().pid {
                        slot.insert(observation);
                    }
                }
            }
        }
        snapshot
    }

    /// Snapshot with no filtering, mostly for callers that already hold clean data.
    pub fn from_observations<I, S>(observations: I) -> Self
    where
        I: IntoIterator<Item = (S, ProcessObservation)>,
        S: Into<String>,
    {
        Self {
            processes: observations.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            skipped: 0,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ProcessObservation> {
        self.processes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProcessObservation)> {
        self.processes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Rows dropped because of per-entry failures
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Anything that can read the process table. Implementations must be read-only.
pub trait ProcessSource: Send + Sync {
    fn sample(&self) -> Result<Snapshot, SampleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pid: u32, name: &str) -> Result<RawProcess, EntryError> {
        Ok(RawProcess {
            pid,
            name: Some(name.to_string()),
            os_create_time: None,
        })
    }

    #[test]
    fn filter_drops_system_prefixes_and_bad_pids() {
        let filter = ProcessFilter::default();
        let snap = Snapshot::from_entries(
            vec![
                raw(4, "System"),
                raw(120, "Registry"),
                raw(0, "idle"),
                raw(77, ""),
                Ok(RawProcess { pid: 78, name: None, os_create_time: None }),
                raw(300, "bash"),
            ],
            &filter,
        );
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("bash").map(|o| o.pid), Some(300));
    }

    #[test]
    fn custom_prefixes_replace_defaults() {
        let filter = ProcessFilter::new(&SamplerConfig {
            exclude_prefixes: vec!["kworker".to_string()],
            min_pid: 10,
        });
        let snap = Snapshot::from_entries(
            vec![raw(5, "init"), raw(11, "kworker/0:1"), raw(12, "System")],
            &filter,
        );
        assert!(snap.contains("System"));
        assert!(!snap.contains("init"));
        assert!(!snap.contains("kworker/0:1"));
    }

    #[test]
    fn same_name_keeps_lowest_pid() {
        let snap = Snapshot::from_entries(
            vec![raw(900, "worker"), raw(200, "worker"), raw(500, "worker")],
            &ProcessFilter::default(),
        );
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("worker").unwrap().pid, 200);
    }
}
