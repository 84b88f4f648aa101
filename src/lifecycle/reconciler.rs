//! Snapshot diffing. An identity is either untracked or has exactly one open record.

use super::{LifespanRecord, StartedProcess, TrackedProcess, Transitions};
use crate::collectors::Snapshot;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct LifecycleReconciler {
    tracked: BTreeMap<String, TrackedProcess>,
}

impl LifecycleReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one snapshot observed at `now`.
    ///
    /// New names open a record stamped with `now`; names that left the snapshot are
    /// closed into a [`LifespanRecord`]. Names present on both sides are left alone,
    /// even if their PID changed.
    pub fn reconcile(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> Transitions {
        let mut out = Transitions::default();

        for (name, observed) in snapshot.iter() {
            if self.tracked.contains_key(name) {
                continue;
            }
            self.tracked.insert(
                name.to_string(),
                TrackedProcess {
                    name: name.to_string(),
                    pid: observed.pid,
                    start_time: now,
                    os_create_time: observed.os_create_time,
                },
            );
            out.started.push(StartedProcess {
                name: name.to_string(),
                pid: observed.pid,
            });
        }

        let missing: Vec<String> = self
            .tracked
            .keys()
            .filter(|name| !snapshot.contains(name))
            .cloned()
            .collect();
        for name in missing {
            if let Some(tracked) = self.tracked.remove(&name) {
                out.ended.push(LifespanRecord::new(
                    tracked.name,
                    tracked.pid,
                    tracked.start_time,
                    now,
                ));
            }
        }

        out
    }

    /// Live table ordered by first observation, then name.
    pub fn tracked(&self) -> Vec<TrackedProcess> {
        let mut list: Vec<TrackedProcess> = self.tracked.values().cloned().collect();
        list.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.name.cmp(&b.name)));
        list
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.tracked.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Drop every open record without closing it.
    pub fn clear(&mut self) {
        self.tracked.clear();
    }
}
