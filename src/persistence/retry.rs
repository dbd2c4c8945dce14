//! Bounded retry policy with randomized backoff.
//!
//! The policy is a pure function of the attempt number, whether the last
//! attempt succeeded, and a jitter sample in `[0, 1)`. Callers supply the
//! jitter and do the sleeping, so the policy is testable without a clock.

use std::time::Duration;

/// What to do after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The attempt produced an acceptable result
    Accept,
    /// Wait this long, then try again
    Retry(Duration),
    /// Budget exhausted
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    /// Decide the next step after attempt number `attempt` (zero-based)
    pub fn decide(&self, attempt: usize, succeeded: bool, jitter: f64) -> RetryDecision {
        if succeeded {
            RetryDecision::Accept
        } else if attempt + 1 >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.backoff(jitter))
        }
    }

    /// Backoff for a jitter sample, within `[0, max_backoff]`
    pub fn backoff(&self, jitter: f64) -> Duration {
        self.max_backoff.mul_f64(jitter.clamp(0.0, 1.0))
    }

    /// Longest total time a caller can spend sleeping under this policy
    pub fn worst_case(&self) -> Duration {
        self.max_backoff * (self.max_attempts.saturating_sub(1) as u32)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, 500)
    }
}

/// Sleep primitive used between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
