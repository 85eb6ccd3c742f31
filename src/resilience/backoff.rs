//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::PollingConfig;

/// Calculate exponential backoff delay with jitter.
///
/// Attempt 0 is immediate; attempt `n` waits `base * 2^(n-1)` capped at
/// `max`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = Duration::from_millis(delay_ms.min(max_ms));

    // Jitter in microseconds so millisecond-scale delays still spread out.
    let jitter_range = capped_delay.as_micros() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    capped_delay + Duration::from_micros(jitter)
}

/// Stateful randomized backoff for polling a pending result.
///
/// Each step doubles the wait until the cap; roughly one step in eight backs
/// off by one level instead.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
}

impl PollBackoff {
    pub fn new(config: PollingConfig) -> Self {
        Self {
            attempt: 1,
            base_ms: config.base_ms.max(1),
            max_ms: config.max_ms.max(config.base_ms).max(1),
        }
    }

    /// Delay for this step, advancing the internal attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = calculate_backoff(self.attempt, self.base_ms, self.max_ms);

        let mut rng = rand::thread_rng();
        if self.attempt > 1 && rng.gen_ratio(1, 8) {
            self.attempt -= 1;
        } else if delay < Duration::from_millis(self.max_ms) {
            self.attempt += 1;
        }

        delay
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000);
        assert!(max.as_millis() <= 1100);
    }

    #[test]
    fn test_zero_attempt_is_immediate() {
        assert_eq!(calculate_backoff(0, 100, 1000), Duration::ZERO);
    }

    #[test]
    fn test_poll_backoff_stays_bounded() {
        let mut backoff = PollBackoff::new(PollingConfig { base_ms: 1, max_ms: 16 });
        let mut longest = Duration::ZERO;
        for _ in 0..200 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(1));
            longest = longest.max(delay);
        }
        // 16ms cap plus at most 10% jitter.
        assert!(longest <= Duration::from_micros(17_600));
        assert!(longest >= Duration::from_millis(8));
    }
}
