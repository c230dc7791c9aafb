use serde::Deserialize;
use std::future::Future;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::error::AppResult;

/// Exponential backoff for confirmation polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Total time budget before reporting "not confirmed yet"
    pub max_wait_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 300,
            max_delay_ms: 5_000,
            max_wait_ms: 60_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay before attempt `attempt + 1`, doubling up to the cap
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Poll `check` until it reports confirmed or the wait budget runs out
///
/// Returns `Ok(false)` on timeout; errors from `check` are returned as-is.
pub async fn wait_for_confirmation<F, Fut>(policy: &BackoffPolicy, mut check: F) -> AppResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<bool>>,
{
    let start = Instant::now();
    let budget = Duration::from_millis(policy.max_wait_ms);
    let mut attempt = 0u32;

    loop {
        if check().await? {
            return Ok(true);
        }

        let delay = policy.delay(attempt);
        if start.elapsed() + delay > budget {
            debug!("Gave up waiting for confirmation after {} attempts", attempt + 1);
            return Ok(false);
        }

        sleep(delay).await;
        attempt += 1;
    }
}
