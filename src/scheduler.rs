//! Fixed-interval tick driver.
//!
//! Each tick runs the callback on tokio's blocking pool. A tick that fails or panics is
//! logged and the next one runs as usual. `stop` does not wait: it signals the loop and
//! returns, and a tick already running is left to finish on its own.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

pub type TickError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,
    #[error("polling interval must be greater than zero")]
    ZeroInterval,
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct PollingScheduler {
    runtime: Handle,
    running: Option<Running>,
}

impl PollingScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            running: None,
        }
    }

    /// Start ticking. The first tick fires immediately.
    pub fn start<F>(&mut self, interval: Duration, on_tick: F) -> Result<(), SchedulerError>
    where
        F: Fn() -> Result<(), TickError> + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }
        let (shutdown, rx) = watch::channel(false);
        let task = self.runtime.spawn(tick_loop(interval, Arc::new(on_tick), rx));
        self.running = Some(Running { shutdown, task });
        debug!(interval_ms = interval.as_millis() as u64, "scheduler started");
        Ok(())
    }

    /// Halt ticking. Returns false if it was not running.
    pub fn stop(&mut self) -> bool {
        match self.running.take() {
            Some(running) => {
                let _ = running.shutdown.send(true);
                debug!("scheduler stop requested");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tick_loop<F>(interval: Duration, on_tick: Arc<F>, mut shutdown: watch::Receiver<bool>)
where
    F: Fn() -> Result<(), TickError> + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        tick += 1;

        let f = Arc::clone(&on_tick);
        let mut work = tokio::task::spawn_blocking(move || (*f)());
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            joined = &mut work => match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(tick, error = %e, "tick failed"),
                Err(e) => error!(tick, error = %e, "tick panicked"),
            },
        }
    }
    debug!(ticks = tick, "scheduler loop exited");
}
