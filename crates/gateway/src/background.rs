//! Cancelable scheduler for periodic background work.
//!
//! Every timer loop in Bastion (cache cleanup, alert monitor, reconcile job)
//! runs as a task owned by a [`Scheduler`]. Shutting the scheduler down
//! cancels every loop and waits until each has exited, so no timer outlives
//! shutdown.

use std::future::Future;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Owns background tasks and cancels them together.
///
/// Cloning yields a handle to the same set of tasks.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` every `period` until shutdown. The first run is immediate.
    ///
    /// A run still in progress when shutdown is requested is dropped at its
    /// next await point. Overrunning ticks are delayed, not bunched.
    pub fn spawn_periodic<F, Fut>(&self, name: impl Into<String>, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let token = self.token.clone();
        let period = period.max(Duration::from_millis(1));

        self.tracker.spawn(async move {
            info!(task = %name, period_ms = period.as_millis(), "background task starting");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                debug!(task = %name, "background tick");
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = task() => {}
                }
            }
            info!(task = %name, "background task stopped");
        });
    }

    /// Run a one-shot future that is dropped on shutdown.
    pub fn spawn<Fut>(&self, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = fut => {}
            }
        });
    }

    /// Number of tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A token cancelled when this scheduler shuts down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel every task and wait for all of them to finish.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("scheduler drained");
    }
}
