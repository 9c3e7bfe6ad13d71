pub mod client;
pub mod scheduler;
pub mod stats;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::backend::{self, WriteBackend};
use crate::config::{Config, LoadConfig};
use crate::domain::{key_space_end, DerivedRates, PlanError, SharedPayload};

pub use client::WriteClient;
pub use scheduler::{Scheduler, TaskStatus};
pub use stats::{Drained, StatsSnapshot, WriteStats};

/// Number of report snapshots kept for inspection.
pub const REPORT_HISTORY: usize = 64;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid load configuration: {0}")]
    InvalidConfig(#[from] PlanError),
    #[error("load test is already running")]
    AlreadyRunning,
    #[error("load test was stopped and cannot be restarted")]
    AlreadyStopped,
}

/// Lifecycle of a load test. There is no way back from `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Initialized,
    Running,
    Stopped,
}

/// State shared by every client and the reporter.
pub struct LoadContext {
    pub rates: DerivedRates,
    pub uid_base: i64,
    pub mutations_per_write: usize,
    pub payload: SharedPayload,
    pub stats: WriteStats,
    stopped: AtomicBool,
    in_flight: AtomicU64,
    idle: Notify,
}

impl LoadContext {
    pub fn new(
        rates: DerivedRates,
        uid_base: i64,
        value_length: usize,
        mutations_per_write: usize,
    ) -> Self {
        Self {
            rates,
            uid_base,
            mutations_per_write,
            payload: SharedPayload::random(value_length),
            stats: WriteStats::new(),
            stopped: AtomicBool::new(false),
            in_flight: AtomicU64::new(0),
            idle: Notify::new(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    /// Upserts dispatched but not yet completed.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    fn write_started(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    fn write_finished(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Resolve once no upsert is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a completion in between is not missed.
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct Reporter {
    ctx: Arc<LoadContext>,
    interval_seconds: u64,
    history: RwLock<VecDeque<StatsSnapshot>>,
}

impl Reporter {
    fn report(&self) -> StatsSnapshot {
        let snapshot = StatsSnapshot::from_drained(self.ctx.stats.drain(), self.interval_seconds);
        info!(
            write_count = snapshot.write_count,
            qps = snapshot.qps,
            avg_latency_ms = snapshot.avg_latency_ms,
            in_flight = self.ctx.in_flight(),
            "{snapshot}"
        );
        let mut history = self.history.write();
        if history.len() == REPORT_HISTORY {
            history.pop_front();
        }
        history.push_back(snapshot.clone());
        snapshot
    }
}

/// Owns the client set, partitions the load and drives reporting.
pub struct LoadController {
    ctx: Arc<LoadContext>,
    clients: Vec<Arc<WriteClient>>,
    scheduler: Scheduler,
    reporter: Arc<Reporter>,
    phase: Mutex<Phase>,
    backend_name: &'static str,
}

impl LoadController {
    pub fn new(cfg: &LoadConfig, backend: Arc<dyn WriteBackend>) -> Result<Self, LoadError> {
        let rates = DerivedRates::derive(cfg.client_count, cfg.uid_count, cfg.write_interval_seconds)?;
        if key_space_end(cfg.uid_base, cfg.uid_count).is_none() {
            return Err(PlanError::KeySpaceOverflow {
                base: cfg.uid_base,
                uid_count: cfg.uid_count,
            }
            .into());
        }
        if rates.unused_keys > 0 {
            warn!(
                uid_count = cfg.uid_count,
                client_count = cfg.client_count,
                unused_keys = rates.unused_keys,
                "uid_count is not a multiple of client_count; trailing keys are never written"
            );
        }
        if rates.per_client_qps == 0 {
            warn!(
                global_qps = rates.global_qps,
                client_count = cfg.client_count,
                "per-client qps rounds down to zero; no writes will be issued"
            );
        }

        let ctx = Arc::new(LoadContext::new(
            rates,
            cfg.uid_base,
            cfg.value_length,
            cfg.mutations_per_write,
        ));
        let clients = (0..cfg.client_count)
            .map(|i| Arc::new(WriteClient::new(i, ctx.clone(), backend.clone())))
            .collect();
        let reporter = Arc::new(Reporter {
            ctx: ctx.clone(),
            interval_seconds: cfg.report_interval_seconds.max(1),
            history: RwLock::new(VecDeque::with_capacity(REPORT_HISTORY)),
        });

        info!(
            clients = cfg.client_count,
            global_qps = rates.global_qps,
            per_client_qps = rates.per_client_qps,
            per_client_keys = rates.per_client_keys,
            value_length = cfg.value_length,
            backend = backend.name(),
            "load plan ready"
        );

        Ok(Self {
            ctx,
            clients,
            scheduler: Scheduler::new(),
            reporter,
            phase: Mutex::new(Phase::Initialized),
            backend_name: backend.name(),
        })
    }

    /// Register the report tick and every client tick.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), LoadError> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Initialized => {}
            Phase::Running => return Err(LoadError::AlreadyRunning),
            Phase::Stopped => return Err(LoadError::AlreadyStopped),
        }

        self.ctx.resume();
        info!(clients = self.clients.len(), backend = self.backend_name, "load test start");

        let reporter = self.reporter.clone();
        self.scheduler.schedule_every(
            "report",
            Duration::from_secs(self.reporter.interval_seconds),
            move || {
                reporter.report();
            },
        );
        for client in &self.clients {
            client.start(&self.scheduler);
        }

        *phase = Phase::Running;
        Ok(())
    }

    /// Stop issuing writes. Upserts already in flight are left to finish.
    pub fn stop(&self) {
        let mut phase = self.phase.lock();
        self.ctx.stop();
        if *phase != Phase::Stopped {
            info!(in_flight = self.ctx.in_flight(), "load test stop");
            self.scheduler.shutdown();
            *phase = Phase::Stopped;
        }
    }

    /// Wait for the scheduled loops to exit after `stop`.
    pub async fn join(&self) {
        self.scheduler.wait().await;
    }

    /// Stop, wait for the scheduled loops and hand back the writes recorded
    /// since the last report tick. Nothing is added to the report history.
    pub async fn shutdown(&self) -> Drained {
        self.stop();
        self.join().await;
        self.ctx.stats.drain()
    }

    /// Drain the counters and emit a snapshot, as the report tick does.
    pub fn report(&self) -> StatsSnapshot {
        self.reporter.report()
    }

    pub fn last_report(&self) -> Option<StatsSnapshot> {
        self.reporter.history.read().back().cloned()
    }

    /// Most recent report snapshots, oldest first.
    pub fn report_history(&self) -> Vec<StatsSnapshot> {
        self.reporter.history.read().iter().cloned().collect()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn rates(&self) -> DerivedRates {
        self.ctx.rates
    }

    pub fn clients(&self) -> &[Arc<WriteClient>] {
        &self.clients
    }

    pub fn context(&self) -> &Arc<LoadContext> {
        &self.ctx
    }

    pub fn task_statuses(&self) -> Vec<TaskStatus> {
        self.scheduler.statuses()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub controller: Arc<LoadController>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let backend = backend::connect(&cfg.backend).await?;
        let controller = Arc::new(LoadController::new(&cfg.load, backend)?);
        Ok(Self { cfg, controller })
    }
}

pub fn spawn_controller_tasks(state: AppState) {
    let controller = state.controller.clone();
    tokio::spawn(async move {
        if let Err(e) = controller.start() {
            warn!(error=%e, "load controller did not start");
        }
    });
}
