use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Run bookkeeping for one registered task
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatus {
    pub name: String,
    pub period_ms: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
}

/// Recurring-task scheduler.
///
/// Every registration gets its own tokio task and its own interval, so
/// registrations run concurrently on the runtime's worker threads and never
/// wait on each other. If a callback outlives its period the missed ticks are
/// skipped.
pub struct Scheduler {
    shutdown: CancellationToken,
    tracker: TaskTracker,
    statuses: RwLock<Vec<Arc<Mutex<TaskStatus>>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            statuses: RwLock::new(Vec::new()),
        }
    }

    /// Invoke `task` every `period`, first one period from now, until the
    /// scheduler shuts down.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_every<F>(&self, name: impl Into<String>, period: Duration, task: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        self.spawn_loop(name.into(), Instant::now() + period, period, task);
    }

    /// Like `schedule_every`, but the first run happens right away.
    pub fn schedule_now_and_every<F>(&self, name: impl Into<String>, period: Duration, task: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        self.spawn_loop(name.into(), Instant::now(), period, task);
    }

    fn spawn_loop<F>(&self, name: String, first: Instant, period: Duration, task: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let status = Arc::new(Mutex::new(TaskStatus {
            name,
            period_ms: period.as_millis() as u64,
            ..TaskStatus::default()
        }));
        self.statuses.write().push(status.clone());

        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        {
                            let mut st = status.lock();
                            st.last_run = Some(Utc::now());
                            st.run_count += 1;
                        }
                        task();
                    }
                }
            }
            debug!(task = %status.lock().name, "scheduled task stopped");
        });
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.statuses.read().iter().map(|s| s.lock().clone()).collect()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop every registered task. Callbacks already running finish normally.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(tasks = self.statuses.read().len(), "stopping scheduled tasks");
            self.shutdown.cancel();
        }
        self.tracker.close();
    }

    /// Wait until every scheduled loop has exited. Call after `shutdown`.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }
}
