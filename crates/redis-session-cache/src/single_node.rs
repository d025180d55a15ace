//! Single-Node Redis Client
//!
//! Backed by one Redis address and a bounded deadpool connection pool. Each
//! operation borrows a connection, executes one command, and returns the
//! connection (drop returns it even on failure) before the retry decision is
//! made. Connectivity failures are retried immediately up to 3 total
//! attempts: a single node has no failover to wait for, so failing fast is
//! correct.

use async_trait::async_trait;
use deadpool_redis::redis;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use tracing::{debug, info};

use crate::config::SessionCacheConfig;
use crate::retry::RetryPolicy;
use crate::traits::{DataCache, SessionCacheError, normalize_key};

/// Pooled client for a stand-alone Redis node.
pub struct SingleNodeCache {
    pool: Pool,
    retry: RetryPolicy,
}

impl SingleNodeCache {
    /// Build the connection pool from configuration and the first usable
    /// `host:port` pair. The pool is created once and shared by all callers
    /// for the lifetime of the process.
    pub fn connect(config: &SessionCacheConfig) -> Result<Self, SessionCacheError> {
        let node = config.single_node()?;
        info!(
            "Initializing session cache against Redis node {}:{} (db {}, pool size {})",
            node.host, node.port, config.database, config.max_active
        );

        let url = match &config.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, node.host, node.port, config.database
            ),
            None => format!("redis://{}:{}/{}", node.host, node.port, config.database),
        };

        let mut pool_config = PoolConfig::new(config.max_active);
        pool_config.timeouts = Timeouts {
            wait: Some(config.timeout()),
            create: Some(config.timeout()),
            recycle: Some(config.timeout()),
        };

        let mut cfg = Config::from_url(url);
        cfg.pool = Some(pool_config);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            SessionCacheError::Configuration(format!("failed to build Redis connection pool: {e}"))
        })?;

        Ok(Self {
            pool,
            retry: RetryPolicy::SINGLE_NODE,
        })
    }

    async fn connection(&self) -> Result<Connection, SessionCacheError> {
        self.pool.get().await.map_err(|e| {
            SessionCacheError::Connectivity(format!("could not borrow Redis connection: {e}"))
        })
    }
}

#[async_trait]
impl DataCache for SingleNodeCache {
    type Error = SessionCacheError;

    fn backend_name(&self) -> &'static str {
        "redis-single-node"
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), SessionCacheError> {
        let normalized = normalize_key(key);
        let key: &str = normalized.as_ref();
        self.retry
            .run("SET", || async move {
                let mut conn = self.connection().await?;
                let () = redis::cmd("SET")
                    .arg(key.as_bytes())
                    .arg(value)
                    .query_async(&mut conn)
                    .await
                    .map_err(classify)?;
                Ok(())
            })
            .await
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, SessionCacheError> {
        let normalized = normalize_key(key);
        let key: &str = normalized.as_ref();
        self.retry
            .run("SETNX", || async move {
                let mut conn = self.connection().await?;
                let created: bool = redis::cmd("SETNX")
                    .arg(key.as_bytes())
                    .arg(value)
                    .query_async(&mut conn)
                    .await
                    .map_err(classify)?;
                Ok(created)
            })
            .await
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<bool, SessionCacheError> {
        if seconds <= 0 {
            debug!("ignoring non-positive expiry {} for {}", seconds, key);
            return Ok(false);
        }
        let normalized = normalize_key(key);
        let key: &str = normalized.as_ref();
        self.retry
            .run("EXPIRE", || async move {
                let mut conn = self.connection().await?;
                let applied: bool = redis::cmd("EXPIRE")
                    .arg(key.as_bytes())
                    .arg(seconds)
                    .query_async(&mut conn)
                    .await
                    .map_err(classify)?;
                Ok(applied)
            })
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SessionCacheError> {
        let normalized = normalize_key(key);
        let key: &str = normalized.as_ref();
        self.retry
            .run("GET", || async move {
                let mut conn = self.connection().await?;
                let value: Option<Vec<u8>> = redis::cmd("GET")
                    .arg(key.as_bytes())
                    .query_async(&mut conn)
                    .await
                    .map_err(classify)?;
                Ok(value)
            })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, SessionCacheError> {
        let normalized = normalize_key(key);
        let key: &str = normalized.as_ref();
        self.retry
            .run("DEL", || async move {
                let mut conn = self.connection().await?;
                let removed: i64 = redis::cmd("DEL")
                    .arg(key.as_bytes())
                    .query_async(&mut conn)
                    .await
                    .map_err(classify)?;
                Ok(removed > 0)
            })
            .await
    }
}

/// Sort a Redis error into the retryable connectivity bucket or the
/// non-retryable backend bucket.
fn classify(err: redis::RedisError) -> SessionCacheError {
    if err.is_io_error()
        || err.is_timeout()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
    {
        SessionCacheError::Connectivity(err.to_string())
    } else {
        SessionCacheError::Backend(err.to_string())
    }
}
