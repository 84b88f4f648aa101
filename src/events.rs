//! Immutable lifecycle events published to subscribers.

use crate::lifecycle::{LifespanRecord, StartedProcess};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Started(StartedProcess),
    Ended(LifespanRecord),
}

impl MonitorEvent {
    pub fn new(kind: EventKind, ts: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ts,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            EventKind::Started(p) => &p.name,
            EventKind::Ended(r) => &r.name,
        }
    }
}
