//! Monitor configuration. One explicit struct, passed into each component's constructor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Data directory (history file, lock file)
    pub data_dir: PathBuf,
    /// Explicit history file; defaults to `<data_dir>/history.json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_file: Option<PathBuf>,
    /// Process poll interval (seconds)
    pub poll_interval_secs: f64,
    /// Snapshot filtering
    pub sampler: SamplerConfig,
    /// History persistence cadence
    pub persist: PersistConfig,
    /// Limits used by the CLI views
    pub display: DisplayConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Processes whose name starts with any of these are ignored
    pub exclude_prefixes: Vec<String>,
    /// Processes with a lower PID are ignored (PID 0 is always ignored)
    pub min_pid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Persist once this many records are pending (1 = after every ended process)
    pub batch_records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub history_limit: usize,
    pub top_n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    /// Also append log lines to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            history_file: None,
            poll_interval_secs: 2.0,
            sampler: SamplerConfig::default(),
            persist: PersistConfig::default(),
            display: DisplayConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            exclude_prefixes: vec!["System".to_string(), "Registry".to_string()],
            min_pid: 1,
        }
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self { batch_records: 1 }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            top_n: 15,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("procwatch"))
        .unwrap_or_else(|| PathBuf::from(".procwatch"))
}

impl MonitorConfig {
    /// Load from JSON file if present, otherwise defaults. The result is validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str::<MonitorConfig>(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.poll_interval_secs.is_finite() || self.poll_interval_secs <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: format!("must be a positive number of seconds, got {}", self.poll_interval_secs),
            });
        }
        if Duration::try_from_secs_f64(self.poll_interval_secs).is_err() {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: "out of range".to_string(),
            });
        }
        if self.sampler.exclude_prefixes.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::Invalid {
                field: "sampler.exclude_prefixes",
                reason: "an empty prefix would exclude every process".to_string(),
            });
        }
        if self.sampler.min_pid == 0 {
            return Err(ConfigError::Invalid {
                field: "sampler.min_pid",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.persist.batch_records == 0 {
            return Err(ConfigError::Invalid {
                field: "persist.batch_records",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.log.file.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "log.file",
                reason: "must be a file path".to_string(),
            });
        }
        if self.display.history_limit == 0 || self.display.top_n == 0 {
            return Err(ConfigError::Invalid {
                field: "display",
                reason: "limits must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Polling interval. Only meaningful on a validated config.
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_secs).unwrap_or(Duration::from_secs(2))
    }

    pub fn history_path(&self) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("history.json"))
    }
}
