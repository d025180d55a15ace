//! Clustered Redis Client
//!
//! Backed by a sharded/replicated Redis cluster. The cluster connection owns
//! its per-node pools and routes each keyed command to the owning shard,
//! following MOVED/ASK redirections internally; this layer does no manual
//! connection borrowing. When redirections are exhausted or a shard is
//! unreachable, the cluster may be mid-failover, so each retry waits a fixed
//! 4-second backoff for leadership re-election to complete, up to 30 attempts.

use async_trait::async_trait;
use deadpool_redis::redis;
use deadpool_redis::redis::cluster::ClusterClientBuilder;
use deadpool_redis::redis::cluster_async::ClusterConnection;
use tracing::{debug, info};

use crate::config::SessionCacheConfig;
use crate::retry::RetryPolicy;
use crate::traits::{DataCache, SessionCacheError, normalize_key};

/// Client for a multi-node Redis cluster.
pub struct ClusterCache {
    conn: ClusterConnection,
    retry: RetryPolicy,
}

impl ClusterCache {
    /// Build the cluster client from every configured seed node and open the
    /// shared topology connection. Created once at startup; the topology is
    /// never rebuilt by this layer.
    pub async fn connect(config: &SessionCacheConfig) -> Result<Self, SessionCacheError> {
        let nodes = config.cluster_nodes()?;
        info!(
            "Initializing session cache against Redis cluster with {} seed nodes",
            nodes.len()
        );

        let urls: Vec<String> = nodes
            .iter()
            .map(|node| format!("redis://{}:{}", node.host, node.port))
            .collect();

        let mut builder = ClusterClientBuilder::new(urls)
            .connection_timeout(config.timeout())
            .response_timeout(config.timeout());
        if let Some(password) = &config.password {
            builder = builder.password(password.clone());
        }

        let client = builder.build().map_err(|e| {
            SessionCacheError::Configuration(format!("failed to build Redis cluster client: {e}"))
        })?;
        let conn = client.get_async_connection().await.map_err(classify)?;

        Ok(Self {
            conn,
            retry: RetryPolicy::CLUSTER,
        })
    }
}

#[async_trait]
impl DataCache for ClusterCache {
    type Error = SessionCacheError;

    fn backend_name(&self) -> &'static str {
        "redis-cluster"
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), SessionCacheError> {
        let normalized = normalize_key(key);
        let key: &str = normalized.as_ref();
        self.retry
            .run("SET", || async move {
                let mut conn = self.conn.clone();
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
                let mut conn = self.conn.clone();
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
                let mut conn = self.conn.clone();
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
                let mut conn = self.conn.clone();
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
                let mut conn = self.conn.clone();
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

/// Cluster classification adds the redirection/failover kinds to the plain
/// connectivity checks: a MOVED/ASK that survived the client's own redirect
/// handling, TRYAGAIN during slot migration, and CLUSTERDOWN/MASTERDOWN while
/// a shard elects a new primary are all worth waiting out.
fn classify(err: redis::RedisError) -> SessionCacheError {
    let transient = err.is_io_error()
        || err.is_timeout()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || matches!(
            err.kind(),
            redis::ErrorKind::Moved
                | redis::ErrorKind::Ask
                | redis::ErrorKind::TryAgain
                | redis::ErrorKind::ClusterDown
                | redis::ErrorKind::MasterDown
        );
    if transient {
        SessionCacheError::Connectivity(err.to_string())
    } else {
        SessionCacheError::Backend(err.to_string())
    }
}
