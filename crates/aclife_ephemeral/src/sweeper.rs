//! Periodic background eviction.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Shortest interval a sweeper runs at. Shorter requests are raised to it.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Something that can evict its expired state.
pub trait Sweep: Send + Sync + 'static {
    /// Evicts expired state. Returns the number of entries removed.
    fn sweep(&self) -> usize;
}

/// Handle to a background task that sweeps one store on a fixed interval.
///
/// The task stops when [`Sweeper::shutdown`] is awaited or, abruptly, when
/// the handle is dropped.
#[derive(Debug)]
pub struct Sweeper {
    name: &'static str,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawns a sweeper on the current tokio runtime.
    ///
    /// The first sweep runs one full `every` after spawning. An interval
    /// below [`MIN_SWEEP_INTERVAL`] is raised to it.
    pub fn spawn(name: &'static str, target: Arc<dyn Sweep>, every: Duration) -> Self {
        if every < MIN_SWEEP_INTERVAL {
            warn!(store = name, requested = ?every, "sweep interval too short, clamping");
        }
        let every = every.max(MIN_SWEEP_INTERVAL);
        let (stop, mut stopped) = oneshot::channel::<()>();
        let start = tokio::time::Instant::now() + every;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let removed = target.sweep();
                        if removed > 0 {
                            debug!(store = name, removed, "swept expired entries");
                        }
                    }
                }
            }
            debug!(store = name, "sweeper stopped");
        });

        Self {
            name,
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Returns the name used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals the task to stop and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
