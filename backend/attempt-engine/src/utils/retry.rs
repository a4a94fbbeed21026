use serde::Deserialize;
use std::fmt::Display;
use std::time::Duration;

/// Backoff policy for calls to the grader and the stores.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    1000
}

fn default_jitter_ms() -> u64 {
    50
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting. Used by tests and the in-memory wiring.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_ms: 0,
        }
    }

    /// Wait before retry number `retry` (0-based), without jitter.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let ms = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random::<u64>() % (self.jitter_ms + 1))
    }
}

/// Runs `f` until it succeeds or the policy runs out of attempts.
pub async fn retry_async<F, Fut, T, E>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut retry: u32 = 0;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if retry as usize + 1 >= max_attempts {
                    tracing::warn!(
                        "{} failed after {} attempt(s): {}",
                        operation,
                        max_attempts,
                        e
                    );
                    return Err(e);
                }

                let wait = policy.backoff_for(retry) + policy.jitter();
                tracing::debug!(
                    "{} failed (attempt {}), retrying in {:?}: {}",
                    operation,
                    retry + 1,
                    wait,
                    e
                );
                tokio::time::sleep(wait).await;
                retry += 1;
            }
        }
    }
}
