//! Retry and backoff policy.

use std::time::Duration;

/// How hard the engine tries before giving up.
///
/// Per-command timeouts live in the protocol client; this policy governs
/// reconnects, fetch retries and batch-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Upper bound for any reconnect delay.
    pub max_delay: Duration,
    /// Reconnect attempts before the connection is declared lost.
    pub max_attempts: u32,
    /// Delay after a failed commit, doubled per consecutive failure.
    pub commit_base_delay: Duration,
    /// Upper bound for the commit delay.
    pub commit_max_delay: Duration,
    /// In-place retries for a single header fetch.
    pub fetch_retries: u32,
    /// Times a search or a run starts over after the mailbox was renumbered.
    pub search_restarts: u32,
    /// Consecutive batch failures that halve the batch size.
    pub failures_before_shrink: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(120),
            max_attempts: 5,
            commit_base_delay: Duration::from_secs(60),
            commit_max_delay: Duration::from_secs(300),
            fetch_retries: 3,
            search_restarts: 3,
            failures_before_shrink: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before reconnect attempt `attempt` (0-based): `base * 2^attempt`,
    /// capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        exponential(self.base_delay, self.max_delay, attempt)
    }

    /// Delay after `failures` consecutive failed batches (1-based).
    #[must_use]
    pub fn commit_backoff(&self, failures: u32) -> Duration {
        exponential(
            self.commit_base_delay,
            self.commit_max_delay,
            failures.saturating_sub(1),
        )
    }
}

fn exponential(base: Duration, max: Duration, exp: u32) -> Duration {
    let factor = 2u32.checked_pow(exp).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |d| d.min(max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(30));
        assert_eq!(policy.backoff(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(2), Duration::from_secs(120));
        assert_eq!(policy.backoff(3), Duration::from_secs(120));
        assert_eq!(policy.backoff(40), Duration::from_secs(120));
    }

    #[test]
    fn commit_backoff_starts_at_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.commit_backoff(1), Duration::from_secs(60));
        assert_eq!(policy.commit_backoff(2), Duration::from_secs(120));
        assert_eq!(policy.commit_backoff(10), Duration::from_secs(300));
    }
}
