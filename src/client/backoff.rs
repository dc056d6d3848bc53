//! Exponential backoff with jitter for retried export submissions.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub jitter_pct: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
            jitter_pct: 0.20,
        }
    }
}

/// Delay before retry number `attempt_no` (1-based): `base * 2^(n-1)`,
/// capped at `max`, then jittered by up to `jitter_pct` either way.
pub fn next_delay(attempt_no: u32, cfg: &BackoffConfig, rng: &mut impl Rng) -> Duration {
    let exp = attempt_no.max(1) - 1;

    // 2^exp, saturating; the cap below handles huge values
    let pow2 = 1_u32.checked_shl(exp).unwrap_or(u32::MAX);
    let delay = cfg.base.saturating_mul(pow2).min(cfg.max);

    let delay_ms = delay.as_millis() as f64;
    let jitter_range = delay_ms * cfg.jitter_pct;
    let jitter = if jitter_range > 0.0 {
        rng.gen_range(-jitter_range..=jitter_range)
    } else {
        0.0
    };

    let jittered = (delay_ms + jitter).round().clamp(0.0, cfg.max.as_millis() as f64);
    Duration::from_millis(jittered as u64)
}
