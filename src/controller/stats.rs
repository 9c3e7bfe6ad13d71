use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free write counters shared by every client.
///
/// `record` is called from the completion path of each successful upsert;
/// `drain` is called by the reporter only. A record racing a drain can land
/// its count and its millis in adjacent intervals, but no sample is lost or
/// counted twice.
#[derive(Debug, Default)]
pub struct WriteStats {
    write_count: AtomicU64,
    write_millis_sum: AtomicU64,
    total_writes: AtomicU64,
    total_millis: AtomicU64,
}

/// Counters taken by one `drain`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Drained {
    pub write_count: u64,
    pub write_millis_sum: u64,
}

impl WriteStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, duration_millis: u64) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.write_millis_sum.fetch_add(duration_millis, Ordering::Relaxed);
        self.total_writes.fetch_add(1, Ordering::Relaxed);
        self.total_millis.fetch_add(duration_millis, Ordering::Relaxed);
    }

    /// Take the counters accumulated since the previous drain and reset them.
    pub fn drain(&self) -> Drained {
        Drained {
            write_count: self.write_count.swap(0, Ordering::AcqRel),
            write_millis_sum: self.write_millis_sum.swap(0, Ordering::AcqRel),
        }
    }

    /// Counters since process start. Never reset.
    pub fn totals(&self) -> Drained {
        Drained {
            write_count: self.total_writes.load(Ordering::Relaxed),
            write_millis_sum: self.total_millis.load(Ordering::Relaxed),
        }
    }
}

/// Throughput and latency over one report interval.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub write_count: u64,
    pub write_millis_sum: u64,
    pub interval_seconds: u64,
    pub qps: f64,
    pub avg_latency_ms: f64,
    pub taken_at: DateTime<Utc>,
}

impl StatsSnapshot {
    pub fn from_drained(drained: Drained, interval_seconds: u64) -> Self {
        let qps = if interval_seconds == 0 {
            0.0
        } else {
            drained.write_count as f64 / interval_seconds as f64
        };
        let avg_latency_ms = if drained.write_count == 0 {
            0.0
        } else {
            drained.write_millis_sum as f64 / drained.write_count as f64
        };
        Self {
            write_count: drained.write_count,
            write_millis_sum: drained.write_millis_sum,
            interval_seconds,
            qps,
            avg_latency_ms,
            taken_at: Utc::now(),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write qps:{} delay:{}ms", self.qps, self.avg_latency_ms)
    }
}
