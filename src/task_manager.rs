//! Lifecycle of the application's background tasks.
//!
//! Every long-running task is spawned through a [`TaskManager`] so shutdown
//! can wait for all of them. Tasks observe the shared `watch` shutdown
//! signal themselves; the manager only joins them.

use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Handles = Vec<(&'static str, JoinHandle<()>)>;

#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Handles>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    fn handles(&self) -> std::sync::MutexGuard<'_, Handles> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawns a task and tracks its handle.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.handles().push((name, handle));
    }

    /// Spawns a task that runs `tick` every `period` until shutdown. The
    /// first run happens one full period after spawning.
    pub fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.get_shutdown_rx();
        self.spawn(name, async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => tick().await,
                }
            }
            debug!(task_name = name, "Periodic task stopped.");
        });
    }

    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Number of tasks currently tracked.
    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for every tracked task to finish, logging any that panicked.
    pub async fn shutdown(self) {
        let handles: Handles = self.handles().drain(..).collect();
        info!(tasks = handles.len(), "Waiting for background tasks to finish.");

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let panicked: Vec<&'static str> = names
            .iter()
            .zip(results)
            .filter_map(|(name, result)| match result {
                Ok(()) => {
                    debug!(task_name = name, "Task finished.");
                    None
                }
                Err(e) => {
                    error!(task_name = name, error = %e, "Task panicked.");
                    Some(*name)
                }
            })
            .collect();

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        } else {
            error!(tasks = ?panicked, "{} tasks panicked during shutdown.", panicked.len());
        }
    }
}
