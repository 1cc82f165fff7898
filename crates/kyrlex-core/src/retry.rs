//! Exponential backoff for generation calls.

use std::future::Future;
use std::time::Duration;

use kyrlex_config::GenerationConfig;
use kyrlex_providers::GenerationError;
use tracing::warn;

/// Upper bound on any single backoff sleep.
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            multiplier: config.backoff_multiplier,
        }
    }

    /// Delay after the failed attempt numbered `attempt` (0-based): `base * multiplier^attempt`,
    /// capped at [`MAX_BACKOFF_DELAY`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(MAX_BACKOFF_DELAY))
            .unwrap_or(MAX_BACKOFF_DELAY)
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// Transient failures are retried after [`BackoffPolicy::delay_for`]. A non-transient
/// failure is returned as-is. When every attempt failed transiently the result is
/// [`GenerationError::ExhaustedRetries`] wrapping the last failure.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    mut op: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(GenerationError::ExhaustedRetries {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    "Generation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
