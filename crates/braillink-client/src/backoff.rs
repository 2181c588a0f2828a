//! Rebind scheduling.

use std::time::Duration;

use braillink_core::constants::{DEFAULT_MAX_REBIND_ATTEMPTS, DEFAULT_REBIND_BASE_DELAY};
use serde::Deserialize;

/// Capped exponential backoff for rebinding to the display service.
///
/// Attempt `i` (counting from zero) waits `base_delay * 2^i`; once
/// `max_attempts` attempts have been scheduled the client gives up.
///
/// ```
/// use braillink_client::RebindPolicy;
/// use std::time::Duration;
///
/// let policy = RebindPolicy::default();
/// assert_eq!(policy.delay_for(0), Some(Duration::from_millis(500)));
/// assert_eq!(policy.delay_for(3), Some(Duration::from_millis(4000)));
/// assert_eq!(policy.delay_for(5), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RebindPolicy {
    /// Delay before the first rebind (ms).
    pub base_delay_ms: u64,

    /// Number of rebinds scheduled before giving up.
    pub max_attempts: u32,
}

impl RebindPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay before rebind `attempt`, or `None` once attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Some(Duration::from_millis(self.base_delay_ms.saturating_mul(factor)))
    }
}

impl Default for RebindPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_REBIND_BASE_DELAY,
            max_attempts: DEFAULT_MAX_REBIND_ATTEMPTS,
        }
    }
}
