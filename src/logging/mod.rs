//! Tracing setup (stderr, optional log file) and ndjson output.

mod format;

pub use format::{BoxedSubscriber, LogGuard, StructuredLogger};
