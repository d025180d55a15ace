//! Data-Cache Trait and Error Types
//!
//! This module provides the core DataCache trait abstraction that enables
//! pluggable Redis backends for different deployment scenarios:
//! - SingleNode: one Redis address behind a bounded connection pool
//! - Cluster: a sharded/replicated Redis cluster with failover tolerance

use std::borrow::Cow;

use async_trait::async_trait;

/// Core trait for session cache backends.
///
/// Five operations, each idempotent except `put_if_absent`. Callers never see a
/// missing key as an error: `get` returns `Ok(None)` and `delete` returns
/// `Ok(false)`. Implementations normalize keys with [`normalize_key`] before
/// transmission so that both backends address entries identically.
#[async_trait]
pub trait DataCache: Send + Sync {
    /// Error type for cache operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Backend name used in logs and diagnostics
    fn backend_name(&self) -> &'static str;

    /// Unconditional upsert. No expiry is set; callers set expiry separately
    /// via [`DataCache::expire`].
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), Self::Error>;

    /// Atomic create-only write (Redis `SETNX`).
    ///
    /// Returns `true` when this call created the entry. Under N concurrent
    /// callers targeting the same absent key, exactly one observes `true`.
    /// This is the only operation with a cross-caller ordering guarantee and
    /// is used for first-write-wins mutual exclusion.
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, Self::Error>;

    /// Set the entry's time-to-live in seconds. Idempotent.
    ///
    /// Returns `true` when the expiry was applied to an existing entry. A
    /// non-positive `seconds` is treated as "no expiry change" and returns
    /// `false` without touching the backend.
    async fn expire(&self, key: &str, seconds: i64) -> Result<bool, Self::Error>;

    /// Fetch an entry. Absent is a first-class result, never an error.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Remove an entry. Idempotent; deleting a non-existent key returns
    /// `Ok(false)`.
    async fn delete(&self, key: &str) -> Result<bool, Self::Error>;
}

/// Unified error type for the session cache layer.
///
/// Only `Connectivity` is retryable; the retry loops in both backends consult
/// [`SessionCacheError::is_retryable`] and surface everything else on first
/// occurrence.
#[derive(Debug, thiserror::Error)]
pub enum SessionCacheError {
    /// Transient backend unreachability. Retried locally up to the backend's
    /// attempt bound, surfaced only after retries are exhausted.
    #[error("backend unreachable: {0}")]
    Connectivity(String),

    /// Protocol-level backend failure (bad command, auth rejection, wrong
    /// type). Never retried.
    #[error("backend error: {0}")]
    Backend(String),

    /// Malformed bytes, truncated stream, or an unserializable value.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An attribute type in the blob cannot be resolved by the supplied
    /// resolution context. The caller should treat the session as unreadable.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Malformed or missing startup configuration. Fatal at startup; no
    /// partial initialization.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SessionCacheError {
    /// Whether a retry attempt can reasonably change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionCacheError::Connectivity(_))
    }
}

impl From<serde_json::Error> for SessionCacheError {
    fn from(err: serde_json::Error) -> Self {
        SessionCacheError::Encoding(err.to_string())
    }
}

/// Type alias for boxed data-cache trait object with the unified error type
pub type BoxedDataCache = dyn DataCache<Error = SessionCacheError>;

/// Replace every whitespace character in a cache key with an underscore.
///
/// Applied identically by every backend before transmission, so `"sess 123"`
/// and `"sess_123"` address the same entry.
pub fn normalize_key(key: &str) -> Cow<'_, str> {
    if key.contains(char::is_whitespace) {
        Cow::Owned(
            key.chars()
                .map(|c| if c.is_whitespace() { '_' } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(key)
    }
}
