//! Ephemeral session records in Redis.
//!
//! Every round-trip is bounded by [`STORE_TIMEOUT`]; a slow backend surfaces
//! as a store failure, not a hung request.

use super::{EphemeralStore, STORE_TIMEOUT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info_span, Instrument};

#[derive(Clone)]
pub struct RedisEphemeralStore {
    manager: ConnectionManager,
}

impl RedisEphemeralStore {
    /// Open a managed connection to the Redis at `url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the initial connection
    /// cannot be established within the store timeout.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let manager = timeout(STORE_TIMEOUT, ConnectionManager::new(client))
            .await
            .context("redis connect timed out")?
            .context("failed to connect to redis")?;

        Ok(Self { manager })
    }
}

#[async_trait]
impl EphemeralStore for RedisEphemeralStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", db.operation = "EXISTS", db.key = key);
        let exists: bool = timeout(
            STORE_TIMEOUT,
            redis::cmd("EXISTS").arg(key).query_async(&mut conn),
        )
        .instrument(span)
        .await
        .context("redis EXISTS timed out")?
        .context("redis EXISTS failed")?;

        Ok(exists)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", db.operation = "GET", db.key = key);
        let value: Option<String> = timeout(
            STORE_TIMEOUT,
            redis::cmd("GET").arg(key).query_async(&mut conn),
        )
        .instrument(span)
        .await
        .context("redis GET timed out")?
        .context("redis GET failed")?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", db.operation = "SET", db.key = key);
        timeout(
            STORE_TIMEOUT,
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl.as_secs())
                .query_async::<()>(&mut conn),
        )
        .instrument(span)
        .await
        .context("redis SET timed out")?
        .context("redis SET failed")?;

        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", db.operation = "SET NX", db.key = key);
        // NX makes the write the atomic gate; a Nil reply means someone won
        // the race first.
        let reply: redis::Value = timeout(
            STORE_TIMEOUT,
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl.as_secs())
                .query_async(&mut conn),
        )
        .instrument(span)
        .await
        .context("redis SET NX timed out")?
        .context("redis SET NX failed")?;

        Ok(!matches!(reply, redis::Value::Nil))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", db.operation = "DEL", db.key = key);
        timeout(
            STORE_TIMEOUT,
            redis::cmd("DEL").arg(key).query_async::<()>(&mut conn),
        )
        .instrument(span)
        .await
        .context("redis DEL timed out")?
        .context("redis DEL failed")?;

        Ok(())
    }
}
