use rand::Rng;
use std::sync::atomic::{AtomicU8, Ordering};

/// Default number of bytes rewritten before each upsert.
pub const DEFAULT_MUTATIONS_PER_WRITE: usize = 100;

/// Byte buffer shared by every client and every in-flight write.
///
/// Mutation is deliberately unsynchronized: concurrent clients scribble over
/// each other and a snapshot may mix bytes from several mutations. The
/// written content carries no meaning, only its size and churn do. Each byte
/// is a relaxed atomic cell so the race stays within safe Rust without
/// adding a lock to the write path.
#[derive(Debug)]
pub struct SharedPayload {
    bytes: Box<[AtomicU8]>,
}

impl SharedPayload {
    /// Buffer of `len` random bytes.
    pub fn random(len: usize) -> Self {
        let mut rng = rand::thread_rng();
        let bytes = (0..len).map(|_| AtomicU8::new(rng.gen())).collect();
        Self { bytes }
    }

    pub fn from_bytes(initial: &[u8]) -> Self {
        Self {
            bytes: initial.iter().map(|b| AtomicU8::new(*b)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Overwrite `count` randomly chosen positions with random values.
    pub fn mutate(&self, count: usize) {
        self.mutate_with(&mut rand::thread_rng(), count);
    }

    pub fn mutate_with<R: Rng>(&self, rng: &mut R, count: usize) {
        if self.bytes.is_empty() {
            return;
        }
        for _ in 0..count {
            let idx = rng.gen_range(0..self.bytes.len());
            self.bytes[idx].store(rng.gen(), Ordering::Relaxed);
        }
    }

    /// Copy of the current content, used as the value of one upsert.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }
}
