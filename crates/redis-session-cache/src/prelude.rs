//! # Session Cache Prelude
//!
//! This module provides convenient re-exports of the most commonly used types
//! from the session cache library.
//!
//! ```rust
//! use redis_session_cache::prelude::*;
//! ```

// Core trait and types
pub use crate::traits::{BoxedDataCache, DataCache, SessionCacheError, normalize_key};

// Backends
pub use crate::cluster::ClusterCache;
pub use crate::single_node::SingleNodeCache;

// Configuration and retry policy
pub use crate::config::{HostPort, SessionCacheConfig};
pub use crate::retry::RetryPolicy;

// Serialization protocol
pub use crate::serializer::{
    AttributeResolver, JsonAttributeResolver, SessionMetadata, decode, encode, fingerprint,
    read_attributes, write_attributes,
};

// Convenience functions
pub use crate::{connect, create_cluster_cache, create_single_node_cache};
