//! Recurring deployment status polling

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Poller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between two status checks
    pub interval: Duration,

    /// Give up after polling this long, `None` polls until a terminal status
    pub max_duration: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(8000),
            max_duration: None,
        }
    }
}

/// Returned by a poll step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

/// Run `step` every `options.interval`, starting one interval from now
///
/// A step is awaited before the next tick is considered, so a slow step
/// delays the following ones instead of overlapping with them. `step`
/// receives the time elapsed since the poller started.
pub async fn run<S, F>(options: &Options, mut step: S)
where
    S: FnMut(Duration) -> F,
    F: Future<Output = Tick>,
{
    let started = Instant::now();
    let mut ticker = interval_at(started + options.interval, options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if step(started.elapsed()).await == Tick::Stop {
            debug!("Poller stopping after {:?}", started.elapsed());
            return;
        }
    }
}

/// The single outstanding poll task of a controller
///
/// Dropping it aborts the task.
#[derive(Debug)]
pub struct PollTask {
    epoch: u64,
    handle: Option<JoinHandle<()>>,
}

impl PollTask {
    pub fn new(epoch: u64, handle: JoinHandle<()>) -> Self {
        Self {
            epoch,
            handle: Some(handle),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Release the task without aborting it
    ///
    /// Used from inside the task itself, which then stops on its own.
    pub fn detach(mut self) {
        self.handle.take();
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
