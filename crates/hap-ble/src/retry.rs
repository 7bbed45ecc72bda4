//! Reconnect-and-retry for characteristic transport calls.

use std::future::Future;
use std::time::Duration;

use hap_core::error::Result;
use tracing::{debug, warn};

use crate::traits::CharacteristicTransport;

/// How transport calls are retried after a link failure.
///
/// Only transient (transport) errors are retried. Before each retry the policy
/// waits and then asks the transport to reconnect. The operation is replayed
/// as-is: whatever it already committed to, such as a transaction id, is
/// reused rather than regenerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    wait: Duration,
}

impl RetryPolicy {
    /// Create a policy builder with the defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            wait: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Run `op`, retrying transient failures on `transport`.
    pub async fn run<T, F, Fut, R>(&self, transport: &T, mut op: F) -> Result<R>
    where
        T: CharacteristicTransport + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Transport call failed, reconnecting"
                    );
                    tokio::time::sleep(self.wait).await;
                    transport.reconnect().await?;
                    attempt += 1;
                    debug!(attempt, "Retrying transport call");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            wait: Duration::from_secs(1),
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Create new builder with defaults.
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
        }
    }

    /// Set the total number of attempts, including the first. Clamped to at least one.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts.max(1);
        self
    }

    /// Set the pause before reconnecting.
    pub fn wait(mut self, wait: Duration) -> Self {
        self.policy.wait = wait;
        self
    }

    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
