//! Process table collector (cross-platform via sysinfo).

use super::{EntryError, ProcessFilter, ProcessSource, RawProcess, SampleError, Snapshot};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, System};
use tracing::trace;

pub struct SysinfoSource {
    sys: Mutex<System>,
    filter: ProcessFilter,
}

impl SysinfoSource {
    pub fn new(filter: ProcessFilter) -> Self {
        Self {
            sys: Mutex::new(System::new()),
            filter,
        }
    }

    fn to_raw(pid: &Pid, process: &Process) -> Result<RawProcess, EntryError> {
        let pid = pid.as_u32();
        // Exited but not yet reaped: the process is already gone for our purposes.
        if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
            return Err(EntryError::Vanished { pid });
        }
        let name = process.name();
        let started = process.start_time();
        Ok(RawProcess {
            pid,
            name: (!name.is_empty()).then(|| name.to_string()),
            os_create_time: (started > 0)
                .then(|| DateTime::<Utc>::from_timestamp(started as i64, 0))
                .flatten(),
        })
    }
}

impl ProcessSource for SysinfoSource {
    fn sample(&self) -> Result<Snapshot, SampleError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SampleError::Unsupported);
        }
        let mut sys = self.sys.lock().map_err(|_| SampleError::Poisoned)?;
        // Only the process list itself; cpu/memory/disk are not needed.
        sys.refresh_processes_specifics(ProcessRefreshKind::new());

        // On Linux every thread of a process is listed as well, under its own tid.
        let threads: HashSet<Pid> = sys
            .processes()
            .iter()
            .flat_map(|(pid, p)| p.tasks().into_iter().flatten().filter(move |tid| *tid != pid))
            .copied()
            .collect();

        let snapshot = Snapshot::from_entries(
            sys.processes()
                .iter()
                .filter(|(pid, _)| !threads.contains(*pid))
                .map(|(pid, p)| Self::to_raw(pid, p)),
            &self.filter,
        );
        trace!(
            tracked = snapshot.len(),
            skipped = snapshot.skipped(),
            threads = threads.len(),
            "sampled process table"
        );
        Ok(snapshot)
    }
}
