use std::time::Duration;

/// Bounded exponential backoff for callback delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, initial_backoff: Duration::from_secs(1), max_backoff: Duration::from_secs(30) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), initial_backoff, max_backoff }
    }

    /// The pause after failed attempt number `attempt` (1-based): the initial backoff doubled for each earlier
    /// failure, capped at `max_backoff`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.initial_backoff.saturating_mul(1u32 << doublings).min(self.max_backoff)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_schedule() {
        let policy = RetryPolicy::default();
        let delays = (1..policy.max_attempts).map(|a| policy.delay_after(a).as_secs()).collect::<Vec<_>>();
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after(5), Duration::from_secs(16));
        assert_eq!(policy.delay_after(6), Duration::from_secs(30));
        assert_eq!(policy.delay_after(40), Duration::from_secs(30));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
    }
}
