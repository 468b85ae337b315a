//! Finalization policy for jobs whose handler failed.

use std::time::Duration;

use crate::job::Job;

/// What to write back after a failed processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalization {
    /// Back to `pending`, claimable again from `scheduled_at`.
    Requeue { scheduled_at: i64 },
    /// Terminal `failed`.
    Fail { scheduled_at: i64 },
}

/// Exponential backoff retry policy.
///
/// `attempts` on the job already counts the attempt that just failed, so the
/// first retry waits `base_delay`, the second `2 * base_delay`, and so on,
/// never more than `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// When false every failure is terminal.
    pub requeue: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(3600),
            requeue: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never requeues: any handler error leaves the job `failed`.
    pub fn disabled() -> Self {
        Self {
            requeue: false,
            ..Self::default()
        }
    }

    /// Delay before the next attempt, given how many attempts have started.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .checked_mul(2u32.saturating_pow(exponent))
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }

    /// Decide how to finalize `job` after a failure.
    pub fn decide(&self, job: &Job, retryable: bool, now: i64) -> Finalization {
        if self.requeue && retryable && job.has_attempts_left() {
            let delay = self.delay_for(job.attempts);
            Finalization::Requeue {
                scheduled_at: now.saturating_add(delay.as_secs() as i64),
            }
        } else {
            Finalization::Fail { scheduled_at: now }
        }
    }
}
