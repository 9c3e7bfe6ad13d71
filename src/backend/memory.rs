use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;

use super::{BackendError, WriteBackend};

/// In-process key-value store with optional simulated round-trip latency and
/// injected failures.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<i64, Vec<u8>>>,
    latency: Duration,
    jitter: Duration,
    failure_ratio: f64,
    attempts: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed delay applied to every upsert.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Uniform random delay in `[0, jitter]` added on top of the fixed latency.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Fraction of upserts that fail, clamped to `[0, 1]`.
    pub fn with_failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn get(&self, key: i64) -> Option<Vec<u8>> {
        self.records.read().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn keys(&self) -> Vec<i64> {
        let mut keys: Vec<i64> = self.records.read().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Upserts received, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn round_trip(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            rng.gen_range(Duration::ZERO..=self.jitter)
        };
        let fail = self.failure_ratio > 0.0 && rng.gen_bool(self.failure_ratio);
        (self.latency + jitter, fail)
    }
}

#[async_trait]
impl WriteBackend for MemoryBackend {
    async fn upsert(&self, key: i64, value: Vec<u8>) -> Result<(), BackendError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let (delay, fail) = self.round_trip();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if fail {
            return Err(BackendError::Unavailable("injected failure".to_string()));
        }

        self.records.write().insert(key, value);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_inserts_then_replaces() {
        let backend = MemoryBackend::new();
        backend.upsert(1, vec![1, 1]).await.unwrap();
        backend.upsert(1, vec![2]).await.unwrap();
        backend.upsert(2, vec![3]).await.unwrap();

        assert_eq!(backend.len(), 2);
        assert_eq!(backend.get(1), Some(vec![2]));
        assert_eq!(backend.keys(), vec![1, 2]);
        assert_eq!(backend.attempts(), 3);
    }

    #[tokio::test]
    async fn test_full_failure_ratio_rejects_everything() {
        let backend = MemoryBackend::new().with_failure_ratio(1.0);
        assert!(backend.upsert(1, vec![0]).await.is_err());
        assert!(backend.is_empty());
        assert_eq!(backend.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_latency_delays_completion() {
        let backend = MemoryBackend::new().with_latency(Duration::from_millis(250));
        let start = tokio::time::Instant::now();
        backend.upsert(7, vec![7]).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
