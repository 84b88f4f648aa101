//! Durable lifespan history: one JSON document, rewritten atomically (temp file + rename).

use super::lock::FileLock;
use crate::lifecycle::LifespanRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// On-disk format version. Any other value is treated as an invalid file.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{operation} failed for '{}': {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("history file '{}' is in use by another monitor", .path.display())]
    Locked { path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Full history plus the time it was last written. `last_updated` is None until the
/// first successful persist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub last_updated: Option<DateTime<Utc>>,
    pub history: Vec<LifespanRecord>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    last_updated: Option<DateTime<Utc>>,
    history: &'a [LifespanRecord],
}

#[derive(Deserialize)]
struct Document {
    version: u32,
    last_updated: Option<DateTime<Utc>>,
    history: Vec<LifespanRecord>,
}

enum LoadOutcome {
    Missing,
    Loaded(HistorySnapshot),
    Unreadable(io::Error),
    Invalid(String),
}

#[derive(Default)]
struct State {
    snapshot: HistorySnapshot,
    /// Records appended since the last successful persist
    pending: usize,
}

pub struct HistoryStore {
    path: PathBuf,
    state: RwLock<State>,
    persist_guard: Mutex<()>,
    _lock: FileLock,
}

impl HistoryStore {
    /// Open the history at `path` for writing. Takes the single-writer lock and loads
    /// existing records; an invalid file is moved aside and history starts empty.
    /// A file that exists but cannot be read is an error, since the next persist
    /// would overwrite it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io("create_dir", parent, e))?;
        }
        let lock = FileLock::try_acquire(&sibling(&path, "lock"))?;

        let snapshot = match read_document(&path) {
            LoadOutcome::Invalid(reason) => {
                let aside = sibling(&path, "corrupt");
                warn!(path = %path.display(), %reason, moved_to = %aside.display(), "history file invalid, starting empty");
                if let Err(e) = fs::rename(&path, &aside) {
                    warn!(path = %path.display(), error = %e, "could not move invalid history aside");
                }
                HistorySnapshot::default()
            }
            LoadOutcome::Unreadable(e) => return Err(StoreError::io("read_history", &path, e)),
            outcome => snapshot_or_empty(&path, outcome),
        };
        info!(path = %path.display(), records = snapshot.history.len(), "history opened");

        Ok(Self {
            path,
            state: RwLock::new(State { snapshot, pending: 0 }),
            persist_guard: Mutex::new(()),
            _lock: lock,
        })
    }

    /// Read a history file without taking ownership of it. Never fails: a missing,
    /// unreadable or invalid file yields an empty snapshot.
    pub fn load(path: &Path) -> HistorySnapshot {
        snapshot_or_empty(path, read_document(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: LifespanRecord) {
        self.append_all([record]);
    }

    /// Append a batch under a single write guard: readers see all of it or none of it.
    pub fn append_all(&self, records: impl IntoIterator<Item = LifespanRecord>) {
        let mut state = self.write();
        let before = state.snapshot.history.len();
        state.snapshot.history.extend(records);
        let added = state.snapshot.history.len() - before;
        state.pending += added;
    }

    /// Rewrite the whole file from memory. On failure nothing in memory changes, so
    /// the next call writes everything again.
    pub fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.persist_guard.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let (history, pending) = {
            let state = self.read();
            (state.snapshot.history.clone(), state.pending)
        };

        write_atomic(
            &self.path,
            &DocumentRef {
                version: FORMAT_VERSION,
                last_updated: Some(now),
                history: &history,
            },
        )?;

        let mut state = self.write();
        state.snapshot.last_updated = Some(now);
        state.pending = state.pending.saturating_sub(pending);
        debug!(path = %self.path.display(), records = history.len(), "history persisted");
        Ok(())
    }

    pub fn records(&self) -> Vec<LifespanRecord> {
        self.read().snapshot.history.clone()
    }

    /// Most recent `limit` records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LifespanRecord> {
        let state = self.read();
        let history = &state.snapshot.history;
        history[history.len().saturating_sub(limit)..].to_vec()
    }

    /// Run `f` over the records without cloning them.
    pub fn with_records<R>(&self, f: impl FnOnce(&[LifespanRecord]) -> R) -> R {
        f(&self.read().snapshot.history)
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        self.read().snapshot.clone()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.read().snapshot.last_updated
    }

    pub fn len(&self) -> usize {
        self.read().snapshot.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending(&self) -> usize {
        self.read().pending
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_document(path: &Path) -> LoadOutcome {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return LoadOutcome::Missing,
        Err(e) => return LoadOutcome::Unreadable(e),
    };
    match serde_json::from_slice::<Document>(&data) {
        Ok(doc) if doc.version == FORMAT_VERSION => LoadOutcome::Loaded(HistorySnapshot {
            last_updated: doc.last_updated,
            history: doc.history,
        }),
        Ok(doc) => LoadOutcome::Invalid(format!("unsupported format version {}", doc.version)),
        Err(e) => LoadOutcome::Invalid(e.to_string()),
    }
}

fn snapshot_or_empty(path: &Path, outcome: LoadOutcome) -> HistorySnapshot {
    match outcome {
        LoadOutcome::Loaded(snapshot) => snapshot,
        LoadOutcome::Missing => {
            debug!(path = %path.display(), "no history file yet");
            HistorySnapshot::default()
        }
        LoadOutcome::Unreadable(e) => {
            warn!(path = %path.display(), error = %e, "history file unreadable, using empty history");
            HistorySnapshot::default()
        }
        LoadOutcome::Invalid(reason) => {
            warn!(path = %path.display(), %reason, "history file invalid, using empty history");
            HistorySnapshot::default()
        }
    }
}

fn write_atomic(path: &Path, doc: &DocumentRef<'_>) -> Result<(), StoreError> {
    let tmp = sibling(path, "tmp");
    let result = (|| {
        let file = File::create(&tmp).map_err(|e| StoreError::io("create_temp", &tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, doc)?;
        writer.flush().map_err(|e| StoreError::io("write", &tmp, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::io("write", &tmp, e.into_error()))?;
        file.sync_all().map_err(|e| StoreError::io("sync", &tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::io("rename", path, e))
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// `history.json` -> `history.json.<suffix>`
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
