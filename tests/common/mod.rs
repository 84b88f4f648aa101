#![allow(dead_code)]

use procwatch::collectors::{ProcessObservation, ProcessSource, SampleError, Snapshot};
use procwatch::config::MonitorConfig;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub fn snap(entries: &[(&str, u32)]) -> Snapshot {
    Snapshot::from_observations(entries.iter().map(|(name, pid)| {
        (
            name.to_string(),
            ProcessObservation {
                pid: *pid,
                os_create_time: None,
            },
        )
    }))
}

pub fn config_in(dir: &Path) -> MonitorConfig {
    MonitorConfig {
        data_dir: dir.to_path_buf(),
        poll_interval_secs: 0.02,
        ..MonitorConfig::default()
    }
}

/// Plays back a fixed list of sample results, then empty snapshots.
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Result<Snapshot, SampleError>>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Result<Snapshot, SampleError>>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
        }
    }
}

impl ProcessSource for ScriptedSource {
    fn sample(&self) -> Result<Snapshot, SampleError> {
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Snapshot::default()))
    }
}

/// Returns whatever snapshot was last set; `None` makes sampling fail.
#[derive(Clone, Default)]
pub struct SharedSource {
    current: Arc<Mutex<Option<Snapshot>>>,
}

impl SharedSource {
    pub fn set(&self, snapshot: Option<Snapshot>) {
        *self.current.lock().unwrap() = snapshot;
    }
}

impl ProcessSource for SharedSource {
    fn sample(&self) -> Result<Snapshot, SampleError> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SampleError::Os("process table unavailable".to_string()))
    }
}

pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
