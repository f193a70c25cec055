//! Reconnect delay policy.
//!
//! Pure arithmetic over an attempt counter the caller owns — the policy
//! itself holds no mutable state, so the supervisor's backoff growth and
//! termination are plain data rather than timer bookkeeping.

use std::time::Duration;

/// Exponential backoff policy for reconnection attempts.
///
/// The delay before attempt `n` (1-based) is `min(cap, base * growth^n)`.
/// Once the attempt counter reaches `max_attempts` the policy signals
/// terminal failure instead of a delay.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Base delay multiplied by the growth factor.
    pub base: Duration,
    /// Multiplicative growth per attempt.
    pub growth: f64,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Attempt count at which retrying stops.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            growth: 1.5,
            cap: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Returns the delay to wait before reconnection attempt `attempt`
    /// (1-based), or `None` once retries are exhausted.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        // Saturate instead of overflowing for absurd growth/attempt inputs;
        // the cap clamps the result anyway.
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let raw_ms = {
            let ms = self.base.as_millis() as f64 * self.growth.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
            if ms.is_finite() && ms >= 0.0 {
                ms.min(u64::MAX as f64) as u64
            } else {
                u64::MAX
            }
        };
        Some(Duration::from_millis(raw_ms).min(self.cap))
    }
}
