//! The backoff calculation the retry supervisor composes on top of.
//!
//! Deliberately jitter-free: the formula is
//! `min(maxBackoffMs, constantMs * base^retries)` with no randomization
//! term, so retry-count assertions in tests stay exact rather than flaky.

use std::time::Duration;

pub fn compute_backoff(constant_ms: u64, max_backoff_ms: u64, base: f64, retries: u32) -> Duration {
    let raw = constant_ms as f64 * base.powi(retries as i32);
    let clamped = raw.min(max_backoff_ms as f64).max(0.0);
    Duration::from_millis(clamped as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_until_clamped() {
        assert_eq!(compute_backoff(100, 10_000, 2.0, 0), Duration::from_millis(100));
        assert_eq!(compute_backoff(100, 10_000, 2.0, 1), Duration::from_millis(200));
        assert_eq!(compute_backoff(100, 10_000, 2.0, 2), Duration::from_millis(400));
    }

    #[test]
    fn clamps_to_max_backoff() {
        assert_eq!(compute_backoff(1000, 5000, 2.0, 10), Duration::from_millis(5000));
    }
}
