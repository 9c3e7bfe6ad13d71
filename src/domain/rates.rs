use serde::Serialize;
use thiserror::Error;

/// Startup-time precondition violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("client_count must be greater than zero")]
    NoClients,
    #[error("write_interval_seconds must be greater than zero")]
    ZeroWriteInterval,
    #[error("uid_base {base} plus uid_count {uid_count} overflows the key type")]
    KeySpaceOverflow { base: i64, uid_count: u64 },
}

/// Rates derived once from the load configuration.
///
/// All divisions are integer divisions; remainders are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DerivedRates {
    pub client_count: usize,
    /// Upserts per second across all clients.
    pub global_qps: u64,
    /// Upserts each client issues per tick.
    pub per_client_qps: u64,
    /// Size of each client's key partition.
    pub per_client_keys: u64,
    /// Keys past the last partition, never written.
    pub unused_keys: u64,
}

impl DerivedRates {
    pub fn derive(
        client_count: usize,
        uid_count: u64,
        write_interval_seconds: u64,
    ) -> Result<Self, PlanError> {
        if client_count == 0 {
            return Err(PlanError::NoClients);
        }
        if write_interval_seconds == 0 {
            return Err(PlanError::ZeroWriteInterval);
        }

        let clients = client_count as u64;
        let global_qps = uid_count / write_interval_seconds;
        let per_client_keys = uid_count / clients;

        Ok(Self {
            client_count,
            global_qps,
            per_client_qps: global_qps / clients,
            per_client_keys,
            unused_keys: uid_count - per_client_keys * clients,
        })
    }

    /// Upserts per second actually issued once per-client rounding applies.
    pub fn effective_qps(&self) -> u64 {
        self.per_client_qps * self.client_count as u64
    }
}
