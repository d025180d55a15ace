//! # Redis-Backed Session Persistence
//!
//! **Externalizes web-application session state to a shared Redis cache so any
//! server instance in a cluster can serve a session created elsewhere.**
//!
//! Two pieces make up the crate:
//!
//! - A [`DataCache`] abstraction with two backends: [`SingleNodeCache`] (one
//!   address, bounded connection pool, 3 immediate retry attempts) and
//!   [`ClusterCache`] (sharded topology, 30 attempts with a 4-second failover
//!   backoff). [`connect`] selects one from configuration at startup.
//! - A [`serializer`] protocol that frames session metadata plus an attribute
//!   body into one blob and computes the attribute fingerprint the host uses
//!   to skip writes when nothing changed.
//!
//! The host session manager drives both: on save it fingerprints the
//! attributes, compares against the last persisted value, and only encodes and
//! writes on change; on load it fetches the blob, decodes metadata into the
//! live session object, and hands the body to its own attribute reader.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use redis_session_cache::{DataCache, SessionCacheConfig, connect};
//!
//! # async fn example() -> Result<(), redis_session_cache::SessionCacheError> {
//! let config = SessionCacheConfig::from_file("conf/session-cache.properties")?;
//! // One client per process, cloned to whoever needs cache access
//! let cache = connect(&config).await?;
//! cache.put("session:abc123", b"...").await?;
//! # Ok(())
//! # }
//! ```

// Core trait and types
mod traits;
/// Core data-cache trait, error taxonomy, and key normalization
pub use traits::*;

// Implementations
pub mod cluster;
pub mod config;
pub mod prelude;
pub mod retry;
pub mod serializer;
pub mod single_node;

use std::sync::Arc;

/// Clustered Redis backend with failover-tolerant retries
pub use cluster::ClusterCache;
/// Startup configuration loaded once from a properties source
pub use config::{HostPort, SessionCacheConfig};
/// Bounded retry combinator shared by both backends
pub use retry::RetryPolicy;
/// Session blob framing, attribute fingerprinting, and resolution context
pub use serializer::{
    AttributeResolver, JsonAttributeResolver, SessionMetadata, decode, encode, fingerprint,
    read_attributes, write_attributes,
};
/// Pooled single-node Redis backend
pub use single_node::SingleNodeCache;

/// Construct the process-wide cache client selected by configuration.
///
/// Called once by whichever component assembles the application; the returned
/// `Arc` is cloned to every caller needing cache access. Callers never learn
/// which backend is active. There is no hot-swap: topology changes require a
/// restart.
pub async fn connect(
    config: &SessionCacheConfig,
) -> Result<Arc<BoxedDataCache>, SessionCacheError> {
    if config.cluster_enabled {
        Ok(Arc::new(ClusterCache::connect(config).await?))
    } else {
        Ok(Arc::new(SingleNodeCache::connect(config)?))
    }
}

/// Create a single-node cache client with default configuration
pub fn create_single_node_cache() -> Result<SingleNodeCache, SessionCacheError> {
    SingleNodeCache::connect(&SessionCacheConfig::default())
}

/// Create a cluster cache client from an explicit configuration
pub async fn create_cluster_cache(
    config: &SessionCacheConfig,
) -> Result<ClusterCache, SessionCacheError> {
    ClusterCache::connect(config).await
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory stand-in for a Redis backend; the single lock gives
    /// `put_if_absent` the same atomicity the real backend provides.
    struct MemoryCache {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryCache {
        fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl DataCache for MemoryCache {
        type Error = SessionCacheError;

        fn backend_name(&self) -> &'static str {
            "memory-test-double"
        }

        async fn put(&self, key: &str, value: &[u8]) -> Result<(), SessionCacheError> {
            let mut entries = self.entries.lock().await;
            entries.insert(normalize_key(key).into_owned(), value.to_vec());
            Ok(())
        }

        async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, SessionCacheError> {
            let mut entries = self.entries.lock().await;
            let key = normalize_key(key).into_owned();
            if entries.contains_key(&key) {
                return Ok(false);
            }
            entries.insert(key, value.to_vec());
            Ok(true)
        }

        async fn expire(&self, _key: &str, _seconds: i64) -> Result<bool, SessionCacheError> {
            Ok(false)
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SessionCacheError> {
            let entries = self.entries.lock().await;
            Ok(entries.get(normalize_key(key).as_ref()).cloned())
        }

        async fn delete(&self, key: &str) -> Result<bool, SessionCacheError> {
            let mut entries = self.entries.lock().await;
            Ok(entries.remove(normalize_key(key).as_ref()).is_some())
        }
    }

    fn metadata(session_id: &str) -> SessionMetadata {
        SessionMetadata {
            session_id: session_id.to_string(),
            creation_time: 1_700_000_000_000,
            last_accessed_time: 1_700_000_000_000,
            max_inactive_interval: 1800,
        }
    }

    #[tokio::test]
    async fn test_save_skip_mutate_reload_scenario() {
        let cache: Arc<BoxedDataCache> = Arc::new(MemoryCache::new());

        // First save: {"user": "alice"}
        let mut attrs = HashMap::from([("user".to_string(), json!("alice"))]);
        let f1 = fingerprint(&attrs).unwrap();
        let blob = encode(&metadata("S1"), |buf| write_attributes(buf, &attrs)).unwrap();
        cache.put("S1", &blob).await.unwrap();

        // Unchanged attributes: same fingerprint, so the host skips the write
        assert_eq!(fingerprint(&attrs).unwrap(), f1);

        // Mutation changes the fingerprint and triggers a new write
        attrs.insert("role".to_string(), json!("admin"));
        let f2 = fingerprint(&attrs).unwrap();
        assert_ne!(f1, f2);
        let blob = encode(&metadata("S1"), |buf| write_attributes(buf, &attrs)).unwrap();
        cache.put("S1", &blob).await.unwrap();

        // Reload on another instance: metadata is copied into the live
        // object, attributes come back through the resolver
        let stored = cache.get("S1").await.unwrap().unwrap();
        let mut live = SessionMetadata::default();
        let mut loaded = HashMap::new();
        let decoded = decode(&stored, |body| {
            loaded = read_attributes(body, &JsonAttributeResolver)?;
            Ok(())
        })
        .unwrap();
        live.copy_from(&decoded);

        assert_eq!(live.session_id, "S1");
        assert_eq!(live.max_inactive_interval, 1800);
        assert_eq!(loaded.get("user"), Some(&json!("alice")));
        assert_eq!(loaded.get("role"), Some(&json!("admin")));
    }

    #[tokio::test]
    async fn test_missing_key_is_absent_not_error() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("nonexistent-key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_if_absent_admits_exactly_one_writer() {
        let cache = Arc::new(MemoryCache::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache
                        .put_if_absent("contested-key", format!("writer-{i}").as_bytes())
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_normalized_and_raw_keys_share_an_entry() {
        let cache = MemoryCache::new();
        cache.put("sess 123", b"payload").await.unwrap();
        assert_eq!(
            cache.get("sess_123").await.unwrap(),
            Some(b"payload".to_vec())
        );
        assert!(cache.delete("sess 123").await.unwrap());
    }
}
