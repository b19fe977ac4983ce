//! Exponential backoff shared by sandbox crash retries and storage
//! write-back retries.

use std::time::Duration;

/// Longest single wait between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Delay before retrying after failed attempt number `attempt` (1-based):
/// `base_ms * 2^(attempt - 1)`, saturating at [`MAX_BACKOFF`].
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(100, 4), Duration::from_millis(800));
    }

    #[test]
    fn test_attempt_zero_waits_base() {
        assert_eq!(backoff_delay(50, 0), Duration::from_millis(50));
    }

    #[test]
    fn test_large_attempts_saturate_at_cap() {
        assert_eq!(backoff_delay(100, 64), MAX_BACKOFF);
        assert_eq!(backoff_delay(100, 65), MAX_BACKOFF);
        assert_eq!(backoff_delay(100, u32::MAX), MAX_BACKOFF);
        assert_eq!(backoff_delay(u64::MAX, 2), MAX_BACKOFF);
    }

    #[test]
    fn test_zero_base_never_waits() {
        assert_eq!(backoff_delay(0, 40), Duration::ZERO);
    }
}
