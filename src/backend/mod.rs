//! Storage backends driven by the load generator.
//!
//! The generator only ever needs one capability from a backend: an
//! asynchronous upsert keyed on an integer. Everything else (pooling,
//! durability, schema) belongs to the implementation.

pub mod memory;
#[cfg(feature = "db")]
pub mod pg;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::{BackendConfig, BackendKind};

pub use memory::MemoryBackend;
#[cfg(feature = "db")]
pub use pg::PgBackend;

/// Failure of a single upsert.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("upsert of key {key} rejected: {reason}")]
    Rejected { key: i64, reason: String },
    #[cfg(feature = "db")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WriteBackend: Send + Sync {
    /// Insert `value` under `key`, replacing any existing record.
    async fn upsert(&self, key: i64, value: Vec<u8>) -> Result<(), BackendError>;

    fn name(&self) -> &'static str;
}

/// Build the backend selected by configuration.
pub async fn connect(cfg: &BackendConfig) -> Result<Arc<dyn WriteBackend>> {
    let backend: Arc<dyn WriteBackend> = match cfg.kind {
        BackendKind::Memory => Arc::new(
            MemoryBackend::new()
                .with_latency(Duration::from_millis(cfg.simulated_latency_ms))
                .with_jitter(Duration::from_millis(cfg.latency_jitter_ms))
                .with_failure_ratio(cfg.failure_ratio),
        ),
        #[cfg(feature = "db")]
        BackendKind::Postgres => Arc::new(PgBackend::connect(cfg).await?),
        #[cfg(not(feature = "db"))]
        BackendKind::Postgres => {
            anyhow::bail!("backend.kind = postgres requires building with the `db` feature")
        }
    };
    info!(backend = backend.name(), "backend ready");
    Ok(backend)
}
