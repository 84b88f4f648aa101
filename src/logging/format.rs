//! Log setup plus a plain ndjson writer for event streams.

use crate::config::LogConfig;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

pub type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

/// Keeps the log file writer alive. Dropping it flushes buffered lines.
#[must_use = "file logging stops when the guard is dropped"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber. If one is already installed it is kept.
    pub fn init(config: &LogConfig) -> LogGuard {
        let (subscriber, guard) = Self::build(config);
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            return LogGuard { _file: None };
        }
        guard
    }

    /// Subscriber writing to stderr, and also to `log.file` when set. The level comes
    /// from RUST_LOG, falling back to `log.level`. stdout is left to the event stream.
    ///
    /// A log file that cannot be opened is reported on stderr and skipped.
    pub fn build(config: &LogConfig) -> (BoxedSubscriber, LogGuard) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

        let (file_writer, guard) = match config.file.as_deref() {
            Some(path) => match open_log_file(path) {
                Ok(file) => {
                    let (writer, guard) = tracing_appender::non_blocking(file);
                    (Some(writer), Some(guard))
                }
                Err(e) => {
                    eprintln!("procwatch: cannot open log file {}: {e}", path.display());
                    (None, None)
                }
            },
            None => (None, None),
        };

        let stderr = output_layer(
            config.json,
            BoxMakeWriter::new(io::stderr),
            io::stderr().is_terminal(),
        );
        let file = file_writer.map(|w| output_layer(config.json, BoxMakeWriter::new(w), false));
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .with(file);
        (Box::new(subscriber), LogGuard { _file: guard })
    }

    /// Empty the log file, creating it if it does not exist.
    pub fn clear_log(path: &Path) -> io::Result<()> {
        File::create(path).map(drop)
    }

    /// Write one value as a single JSON line. Serialization or write errors are returned.
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) -> io::Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(w, "{}", line)
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn output_layer<S>(json: bool, writer: BoxMakeWriter, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file_config(path: PathBuf) -> LogConfig {
        LogConfig {
            level: "debug".to_string(),
            json: false,
            file: Some(path),
        }
    }

    #[test]
    fn log_lines_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("procwatch.log");
        let (subscriber, guard) = StructuredLogger::build(&file_config(path.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(name = "editor", pid = 42, "process ended");
        });
        drop(guard);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("process ended"), "log file was: {text}");
        assert!(text.contains("editor"));
    }

    #[test]
    fn json_lines_in_the_file_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procwatch.log");
        let mut config = file_config(path.clone());
        config.json = true;
        let (subscriber, guard) = StructuredLogger::build(&config);

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(attempt = 3, "history persist failed");
        });
        drop(guard);

        let text = fs::read_to_string(&path).unwrap();
        let line = text.lines().last().unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["fields"]["message"], "history persist failed");
        assert_eq!(value["fields"]["attempt"], 3);
    }

    #[test]
    fn clear_log_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procwatch.log");
        fs::write(&path, "old line\n").unwrap();
        StructuredLogger::clear_log(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        let fresh = dir.path().join("new.log");
        StructuredLogger::clear_log(&fresh).unwrap();
        assert!(fresh.exists());
    }

    #[test]
    fn emit_json_writes_one_line() {
        let mut out = Vec::new();
        StructuredLogger::emit_json(&serde_json::json!({"name": "shell"}), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"name\":\"shell\"}\n");
    }
}
