use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{info, warn};

use super::{BackendError, WriteBackend};
use crate::config::BackendConfig;

const CONNECT_ATTEMPTS: usize = 5;

/// Postgres table of `(key BIGINT PRIMARY KEY, value BYTEA)` records.
pub struct PgBackend {
    pool: PgPool,
    upsert_sql: String,
}

impl PgBackend {
    pub async fn connect(cfg: &BackendConfig) -> Result<Self> {
        let table = checked_table_name(&cfg.table)?;
        info!(table, "connecting to postgres backend");

        let pool = Self::connect_with_retry(cfg, CONNECT_ATTEMPTS).await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (key BIGINT PRIMARY KEY, value BYTEA NOT NULL)"
        ))
        .execute(&pool)
        .await
        .with_context(|| format!("Failed to create table {table}"))?;

        Ok(Self {
            pool,
            upsert_sql: upsert_statement(table),
        })
    }

    async fn connect_with_retry(cfg: &BackendConfig, max_attempts: usize) -> Result<PgPool> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            attempt += 1;
            let result = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
                .connect(&cfg.url)
                .await;
            match result {
                Ok(pool) => return Ok(pool),
                Err(e) if attempt >= max_attempts => {
                    return Err(e).context(format!(
                        "Failed to connect to postgres after {} attempts",
                        max_attempts
                    ));
                }
                Err(e) => {
                    warn!(
                        "Postgres connection attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl WriteBackend for PgBackend {
    async fn upsert(&self, key: i64, value: Vec<u8>) -> Result<(), BackendError> {
        sqlx::query(&self.upsert_sql)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

fn upsert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {table} (key, value) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value"
    )
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn checked_table_name(table: &str) -> Result<&str> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("invalid backend table name: {table:?}");
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(checked_table_name("load_records").is_ok());
        assert!(checked_table_name("").is_err());
        assert!(checked_table_name("1records").is_err());
        assert!(checked_table_name("records; DROP TABLE x").is_err());
    }

    #[test]
    fn test_upsert_statement_replaces_on_conflict() {
        let sql = upsert_statement("load_records");
        assert!(sql.starts_with("INSERT INTO load_records"));
        assert!(sql.contains("ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value"));
    }
}
