//! Process lifecycle tracking: live table of running processes and completed lifespans.

mod reconciler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use reconciler::LifecycleReconciler;

/// A process currently being tracked. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedProcess {
    pub name: String,
    pub pid: u32,
    /// When the engine first observed the process (not the OS creation time)
    pub start_time: DateTime<Utc>,
    pub os_create_time: Option<DateTime<Utc>>,
}

/// A completed lifespan. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifespanRecord {
    pub name: String,
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl LifespanRecord {
    pub fn new(name: String, pid: u32, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            name,
            pid,
            start_time,
            end_time,
            duration_seconds: lifespan_seconds(start_time, end_time),
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

/// `end - start` in seconds at microsecond precision.
pub fn lifespan_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_seconds() as f64,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedProcess {
    pub name: String,
    pub pid: u32,
}

/// Result of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transitions {
    pub started: Vec<StartedProcess>,
    pub ended: Vec<LifespanRecord>,
}

impl Transitions {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.ended.is_empty()
    }
}
