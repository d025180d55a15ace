//! Bounded Retry Combinator
//!
//! Both Redis backends run every operation through [`RetryPolicy::run`], which
//! re-invokes an async closure while the failure is retryable. The two built-in
//! policies are deliberately asymmetric: a single node has no failover to wait
//! for, so it fails fast; a cluster may be electing a new primary for a shard,
//! so it waits out the election with a fixed backoff, up to a ceiling that
//! still bounds worst-case latency.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::traits::SessionCacheError;

/// Attempt bound plus optional inter-attempt delay for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Sleep inserted between attempts. `None` retries immediately.
    pub delay: Option<Duration>,
}

impl RetryPolicy {
    /// Single-node policy: 3 immediate attempts.
    pub const SINGLE_NODE: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        delay: None,
    };

    /// Cluster policy: 30 attempts with a 4-second failover backoff, allowing
    /// roughly two minutes for shard leadership re-election to complete.
    pub const CLUSTER: RetryPolicy = RetryPolicy {
        max_attempts: 30,
        delay: Some(Duration::from_secs(4)),
    };

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// the attempt bound is reached. The final error is surfaced untouched.
    pub async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        mut attempt: F,
    ) -> Result<T, SessionCacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SessionCacheError>>,
    {
        let mut tries = 0u32;
        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && tries < self.max_attempts => {
                    warn!(
                        "{} failed, connection retry attempt {}/{}: {}",
                        op, tries, self.max_attempts, err
                    );
                    if let Some(delay) = self.delay {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(
                            "{} failed after {} attempts, giving up: {}",
                            op, tries, err
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}
