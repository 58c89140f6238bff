//! Linear backoff.

use std::time::Duration;

/// Delay after the `attempt`-th consecutive failure (1-based): `step × attempt`.
pub fn linear_backoff(attempt: u32, step: Duration) -> Duration {
    step.saturating_mul(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_linearly() {
        let step = Duration::from_secs(10);
        assert_eq!(linear_backoff(0, step), Duration::ZERO);
        assert_eq!(linear_backoff(1, step), Duration::from_secs(10));
        assert_eq!(linear_backoff(2, step), Duration::from_secs(20));
        assert_eq!(linear_backoff(3, step), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(linear_backoff(u32::MAX, Duration::MAX), Duration::MAX);
    }
}
