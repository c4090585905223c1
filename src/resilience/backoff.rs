//! Exponential backoff between retry attempts.

use std::time::Duration;

/// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped at `max_ms`.
///
/// Retry 0 is the initial attempt and never waits.
pub fn calculate_backoff(retry: u32, base_ms: u64, max_ms: u64) -> Duration {
    if retry == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(retry - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);

    Duration::from_millis(delay_ms.min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0, 1000, 5000), Duration::ZERO);
        assert_eq!(calculate_backoff(1, 1000, 5000), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(2, 1000, 5000), Duration::from_millis(2000));
        assert_eq!(calculate_backoff(3, 1000, 5000), Duration::from_millis(4000));
        assert_eq!(calculate_backoff(4, 1000, 5000), Duration::from_millis(5000));
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(calculate_backoff(200, 1000, 5000), Duration::from_millis(5000));
    }
}
