use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::scheduler::Scheduler;
use super::LoadContext;
use crate::backend::WriteBackend;
use crate::domain::KeyPartition;

pub const CLIENT_TICK: Duration = Duration::from_secs(1);

/// One virtual client: a key partition plus a per-second write quota.
pub struct WriteClient {
    index: usize,
    partition: KeyPartition,
    qps: u64,
    write_offset: AtomicU64,
    ctx: Arc<LoadContext>,
    backend: Arc<dyn WriteBackend>,
}

impl WriteClient {
    pub fn new(index: usize, ctx: Arc<LoadContext>, backend: Arc<dyn WriteBackend>) -> Self {
        let partition = KeyPartition::new(ctx.uid_base, index, ctx.rates.per_client_keys);
        Self {
            index,
            partition,
            qps: ctx.rates.per_client_qps,
            write_offset: AtomicU64::new(0),
            ctx,
            backend,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn partition(&self) -> KeyPartition {
        self.partition
    }

    pub fn qps(&self) -> u64 {
        self.qps
    }

    /// Writes dispatched so far.
    pub fn write_offset(&self) -> u64 {
        self.write_offset.load(Ordering::Relaxed)
    }

    /// Register the per-second tick with `scheduler`. The first tick fires
    /// right away.
    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) {
        debug!(
            client = self.index,
            key_start = self.partition.start,
            keys = self.partition.len,
            qps = self.qps,
            backend = self.backend.name(),
            "starting write client"
        );
        let client = Arc::clone(self);
        scheduler.schedule_now_and_every(format!("client-{}", self.index), CLIENT_TICK, move || {
            client.tick();
        });
    }

    /// Dispatch one second's worth of upserts and return how many were sent.
    ///
    /// Never waits for the upserts: each one runs as its own task, so writes
    /// from earlier ticks may still be in flight. Failed upserts are dropped
    /// without being recorded.
    pub fn tick(&self) -> u64 {
        if self.ctx.is_stopped() {
            return 0;
        }

        for _ in 0..self.qps {
            let offset = self.write_offset.fetch_add(1, Ordering::Relaxed);
            let key = self.partition.key_at(offset);

            self.ctx.payload.mutate(self.ctx.mutations_per_write);
            let value = self.ctx.payload.snapshot();

            let backend = Arc::clone(&self.backend);
            let ctx = Arc::clone(&self.ctx);
            ctx.write_started();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = backend.upsert(key, value).await;
                if result.is_ok() {
                    ctx.stats.record(started.elapsed().as_millis() as u64);
                }
                ctx.write_finished();
            });
        }
        self.qps
    }
}
