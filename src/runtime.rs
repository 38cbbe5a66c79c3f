use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{Error, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configurable ticker interface: how long one multiplexed wait may block.
pub trait Ticker {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Cooperative cancellation, checked once per loop iteration.
#[derive(Clone, Debug)]
pub struct StopFlag {
    running: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Route Ctrl-C (SIGINT) into the stop flag. May be installed once per process.
pub fn install_interrupt_handler(stop: StopFlag) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("interrupt received");
        stop.request_stop();
    })
    .map_err(|err| Error::Config(format!("signal handler setup failed: {err}")))
}
