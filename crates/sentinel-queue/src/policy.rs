use std::time::Duration;

/// Re-enqueue rule for failed claims, plus how many terminal job records each
/// queue retains before eviction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_base: Duration,
    pub remove_on_complete: usize,
    pub remove_on_fail: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff_base: Duration::from_millis(2000),
            remove_on_complete: 50,
            remove_on_fail: 20,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-running a job whose `attempt`-th try just failed.
    /// Exponential: base, 2×base, 4×base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.backoff_base.saturating_mul(factor)
    }

    /// Whether a job that has already been tried `attempts` times gets
    /// another go.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.attempts
    }
}
