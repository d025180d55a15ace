//! Session Cache Configuration
//!
//! Loaded once at startup from a properties source (`key=value` file or an
//! already-parsed map) and never reloaded. Malformed or missing configuration
//! fails with [`SessionCacheError::Configuration`] before any backend is
//! constructed; there is no partial or degraded initialization.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::traits::SessionCacheError;

/// Default Redis port used when no host list is configured.
pub const DEFAULT_PORT: u16 = 6379;

/// Floor for the connection/response timeout, matching the backend's minimum.
pub const MINIMUM_TIMEOUT_MS: u64 = 2000;

/// Property keys recognized by [`SessionCacheConfig::from_properties`].
pub mod keys {
    pub const CLUSTER_ENABLED: &str = "redis.cluster.enabled";
    pub const HOSTS: &str = "redis.hosts";
    pub const PASSWORD: &str = "redis.password";
    pub const DATABASE: &str = "redis.database";
    pub const TIMEOUT: &str = "redis.timeout";
    pub const MAX_ACTIVE: &str = "redis.max.active";
    pub const MAX_IDLE: &str = "redis.max.idle";
    pub const MIN_IDLE: &str = "redis.min.idle";
    pub const TEST_ON_BORROW: &str = "redis.test.on.borrow";
    pub const TEST_ON_RETURN: &str = "redis.test.on.return";
    pub const TEST_WHILE_IDLE: &str = "redis.test.while.idle";
    pub const EVICTION_RUN_INTERVAL: &str = "redis.eviction.run.interval.millis";
    pub const EVICTION_PER_RUN_COUNT: &str = "redis.eviction.per.run.count";
}

/// One parsed `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

/// Configuration for both cache backends.
///
/// The pool health-check toggles and eviction tuning mirror the original
/// deployment surface; the deadpool-backed single-node client applies the
/// sizing and timeout fields directly and health-checks connections on every
/// recycle regardless of the `test_*` toggles.
#[derive(Debug, Clone)]
pub struct SessionCacheConfig {
    /// Selects the clustered client instead of the single-node client.
    pub cluster_enabled: bool,
    /// Comma-separated `host:port` list.
    pub hosts: String,
    /// Backend auth credential. Empty strings are treated as unset.
    pub password: Option<String>,
    /// Logical database index; single-node only (a cluster serves db 0).
    pub database: i64,
    /// Connection/response timeout in milliseconds, floored at
    /// [`MINIMUM_TIMEOUT_MS`] when read through [`SessionCacheConfig::timeout`].
    pub timeout_ms: u64,
    /// Pool sizing
    pub max_active: usize,
    pub max_idle: usize,
    pub min_idle: usize,
    /// Pool health-check toggles
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    pub test_while_idle: bool,
    /// Idle-connection sweep tuning
    pub eviction_run_interval_ms: u64,
    pub eviction_per_run_count: usize,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            cluster_enabled: false,
            hosts: format!("localhost:{DEFAULT_PORT}"),
            password: None,
            database: 0,
            timeout_ms: MINIMUM_TIMEOUT_MS,
            max_active: 8,
            max_idle: 8,
            min_idle: 0,
            test_on_borrow: false,
            test_on_return: false,
            test_while_idle: false,
            eviction_run_interval_ms: 30_000,
            eviction_per_run_count: 3,
        }
    }
}

impl SessionCacheConfig {
    /// Load configuration from a `key=value` properties file.
    ///
    /// Blank lines and lines starting with `#` or `!` are ignored. A missing
    /// or unreadable file is a configuration error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SessionCacheError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SessionCacheError::Configuration(format!(
                "cannot read properties file {}: {e}",
                path.display()
            ))
        })?;

        let mut properties = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(SessionCacheError::Configuration(format!(
                    "malformed properties line: {line:?}"
                )));
            };
            properties.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self::from_properties(&properties)
    }

    /// Build configuration from an already-parsed property map, applying the
    /// documented default for every absent key.
    pub fn from_properties(
        properties: &HashMap<String, String>,
    ) -> Result<Self, SessionCacheError> {
        let defaults = Self::default();

        let password = properties
            .get(keys::PASSWORD)
            .filter(|p| !p.is_empty())
            .cloned();

        Ok(Self {
            cluster_enabled: parse_or(properties, keys::CLUSTER_ENABLED, defaults.cluster_enabled)?,
            hosts: properties
                .get(keys::HOSTS)
                .cloned()
                .unwrap_or(defaults.hosts),
            password,
            database: parse_or(properties, keys::DATABASE, defaults.database)?,
            timeout_ms: parse_or(properties, keys::TIMEOUT, defaults.timeout_ms)?,
            max_active: parse_or(properties, keys::MAX_ACTIVE, defaults.max_active)?,
            max_idle: parse_or(properties, keys::MAX_IDLE, defaults.max_idle)?,
            min_idle: parse_or(properties, keys::MIN_IDLE, defaults.min_idle)?,
            test_on_borrow: parse_or(properties, keys::TEST_ON_BORROW, defaults.test_on_borrow)?,
            test_on_return: parse_or(properties, keys::TEST_ON_RETURN, defaults.test_on_return)?,
            test_while_idle: parse_or(properties, keys::TEST_WHILE_IDLE, defaults.test_while_idle)?,
            eviction_run_interval_ms: parse_or(
                properties,
                keys::EVICTION_RUN_INTERVAL,
                defaults.eviction_run_interval_ms,
            )?,
            eviction_per_run_count: parse_or(
                properties,
                keys::EVICTION_PER_RUN_COUNT,
                defaults.eviction_per_run_count,
            )?,
        })
    }

    /// Connection/response timeout with the backend-minimum floor applied.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(MINIMUM_TIMEOUT_MS))
    }

    /// Every well-formed `host:port` pair, for seeding the cluster client.
    /// Any malformed pair fails the whole list.
    pub fn cluster_nodes(&self) -> Result<Vec<HostPort>, SessionCacheError> {
        let mut nodes = Vec::new();
        for pair in node_pairs(&self.hosts) {
            nodes.push(parse_pair(&pair)?);
        }
        if nodes.is_empty() {
            return Err(SessionCacheError::Configuration(format!(
                "no cluster nodes in host list {:?}",
                self.hosts
            )));
        }
        Ok(nodes)
    }

    /// The first well-formed pair with a non-empty host and positive port;
    /// parsing stops there. Ill-formed pairs before it are skipped.
    pub fn single_node(&self) -> Result<HostPort, SessionCacheError> {
        for pair in node_pairs(&self.hosts) {
            if let Ok(node) = parse_pair(&pair) {
                return Ok(node);
            }
        }
        Err(SessionCacheError::Configuration(format!(
            "no usable host:port in host list {:?}",
            self.hosts
        )))
    }
}

fn parse_or<T: FromStr>(
    properties: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, SessionCacheError>
where
    T::Err: std::fmt::Display,
{
    match properties.get(key) {
        Some(raw) => raw.parse().map_err(|e| {
            SessionCacheError::Configuration(format!("invalid value {raw:?} for {key}: {e}"))
        }),
        None => Ok(default),
    }
}

fn node_pairs(hosts: &str) -> impl Iterator<Item = String> + '_ {
    // Whitespace anywhere in the list is stripped before splitting
    hosts
        .split(',')
        .map(|pair| pair.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|pair| !pair.is_empty())
}

fn parse_pair(pair: &str) -> Result<HostPort, SessionCacheError> {
    let malformed =
        || SessionCacheError::Configuration(format!("malformed host:port pair {pair:?}"));
    let (host, port) = pair.rsplit_once(':').ok_or_else(malformed)?;
    if host.is_empty() {
        return Err(malformed());
    }
    let port: u16 = port.parse().map_err(|_| malformed())?;
    if port == 0 {
        return Err(malformed());
    }
    Ok(HostPort {
        host: host.to_string(),
        port,
    })
}
