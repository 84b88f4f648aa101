//! procwatch — process lifecycle monitor.
//!
//! Polls the process table, detects starts and ends by process name, and keeps a
//! durable history of completed lifespans.
//!
//! Modular structure:
//! - [`collectors`] — Process table snapshots and filtering
//! - [`lifecycle`] — Live table and start/end reconciliation
//! - [`storage`] — Durable lifespan history
//! - [`stats`] — Per-name counts and durations over the history
//! - [`engine`] — One reconciliation cycle and the query surface
//! - [`scheduler`] / [`monitor`] — Interval polling with start/stop
//! - [`logging`] — Tracing setup and ndjson output

pub mod collectors;
pub mod config;
pub mod engine;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod monitor;
pub mod scheduler;
pub mod stats;
pub mod storage;

pub use collectors::{ProcessSource, Snapshot, SysinfoSource};
pub use config::MonitorConfig;
pub use engine::{CycleReport, Engine};
pub use events::{EventKind, MonitorEvent};
pub use lifecycle::{LifecycleReconciler, LifespanRecord, TrackedProcess};
pub use logging::StructuredLogger;
pub use monitor::Monitor;
pub use scheduler::PollingScheduler;
pub use stats::Statistics;
pub use storage::{HistorySnapshot, HistoryStore};
