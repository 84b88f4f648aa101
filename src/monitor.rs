//! Start/stop control over a polling engine.

use crate::engine::Engine;
use crate::scheduler::{PollingScheduler, SchedulerError};
use crate::storage::StoreError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("final history flush failed: {0}")]
    Flush(#[from] StoreError),
}

pub struct Monitor {
    engine: Arc<Engine>,
    scheduler: PollingScheduler,
    interval: Duration,
}

impl Monitor {
    pub fn new(engine: Arc<Engine>, runtime: Handle, interval: Duration) -> Self {
        Self {
            engine,
            scheduler: PollingScheduler::new(runtime),
            interval,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Begin a fresh session and poll every `interval`.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.scheduler.is_running() {
            return Err(SchedulerError::AlreadyRunning.into());
        }
        self.engine.begin_session();
        let engine = Arc::clone(&self.engine);
        self.scheduler.start(self.interval, move || {
            engine.run_cycle().map(|_| ()).map_err(Into::into)
        })?;
        info!(interval_ms = self.interval.as_millis() as u64, "monitoring started");
        Ok(())
    }

    /// Stop polling, drop still-running processes from the live table and flush history.
    pub fn stop(&mut self) -> Result<(), MonitorError> {
        if !self.scheduler.stop() {
            warn!("stop requested but monitoring was not running");
        }
        self.engine.end_session()?;
        info!(records = self.engine.store().len(), "monitoring stopped");
        Ok(())
    }
}
