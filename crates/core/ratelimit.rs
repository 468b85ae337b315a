//! Per-identity token bucket rate limiting.
//!
//! Locking is two-level: the registry mutex is held only to find or insert a
//! bucket, and each bucket has its own mutex around refill-then-consume. Calls
//! for different identities therefore never wait on each other's accounting.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::RateLimitConfig;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket with lazy refill.
///
/// Tokens are real-valued so refill rates below one per second accumulate
/// across calls. `0 <= tokens <= capacity` holds after every operation.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// `refill_rate` is in tokens per second; negative or non-finite rates are
    /// treated as zero.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self::starting_at(capacity, refill_rate, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `start`.
    pub fn starting_at(capacity: u32, refill_rate: f64, start: Instant) -> Self {
        let refill_rate = if refill_rate.is_finite() && refill_rate > 0.0 {
            refill_rate
        } else {
            0.0
        };
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: start,
            }),
        }
    }

    /// Maximum number of tokens.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Current token level, without refilling.
    pub fn tokens(&self) -> f64 {
        self.state.lock().tokens
    }

    /// Take one token if available.
    pub fn try_consume(&self) -> bool {
        self.try_consume_at(Instant::now())
    }

    /// Take one token if available, treating `now` as the current time.
    ///
    /// Denials never consume.
    pub fn try_consume_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // A `now` earlier than the last refill saturates to zero elapsed.
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        let top_up = elapsed * self.refill_rate;

        // The refill clock only moves when tokens were actually added, so
        // sub-token fractions keep accruing across frequent calls.
        if top_up > 0.0 {
            state.tokens = (state.tokens + top_up).min(f64::from(self.capacity));
            state.last_refill = now;
        }
    }
}

/// Registry of token buckets keyed by identity.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl RateLimiter {
    /// Create a limiter whose buckets all use `config`.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The per-bucket configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admission decision for one request from `identity`.
    ///
    /// Any string is a valid key, including the empty one; callers reject
    /// anonymous requests before getting here.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    /// Like [`allow`](Self::allow) with an explicit current time.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let bucket = self.bucket(identity, now);
        bucket.try_consume_at(now)
    }

    /// Number of identities seen so far.
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Whether no identity has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    /// Find or lazily create the bucket for `identity`.
    ///
    /// The registry lock is released when this returns, before any token
    /// accounting happens.
    fn bucket(&self, identity: &str, now: Instant) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get(identity) {
            return Arc::clone(bucket);
        }

        tracing::debug!(identity = %identity, "Creating rate limit bucket");
        let bucket = Arc::new(TokenBucket::starting_at(
            self.config.capacity,
            self.config.refill_rate,
            now,
        ));
        buckets.insert(identity.to_string(), Arc::clone(&bucket));
        bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_bucket_allows_exactly_capacity_initially() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(10, 1.0, start);

        for i in 0..10 {
            assert!(bucket.try_consume_at(start), "request {} should pass", i + 1);
        }
        assert!(!bucket.try_consume_at(start));
    }

    #[test]
    fn test_denial_does_not_consume() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(1, 0.0, start);

        assert!(bucket.try_consume_at(start));
        for _ in 0..5 {
            assert!(!bucket.try_consume_at(start));
        }
        assert_eq!(bucket.tokens(), 0.0);
    }

    #[test]
    fn test_refill_grants_floor_of_elapsed_times_rate() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(10, 1.0, start);
        for _ in 0..10 {
            assert!(bucket.try_consume_at(start));
        }

        let later = start + Duration::from_millis(2_500);
        assert!(bucket.try_consume_at(later));
        assert!(bucket.try_consume_at(later));
        assert!(!bucket.try_consume_at(later));
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(3, 100.0, start);
        assert!(bucket.try_consume_at(start));

        let later = start + Duration::from_secs(60);
        for _ in 0..3 {
            assert!(bucket.try_consume_at(later));
        }
        assert!(!bucket.try_consume_at(later));
        assert!(bucket.tokens() <= 3.0);
    }

    #[test]
    fn test_fractional_refill_accumulates() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(1, 0.5, start);
        assert!(bucket.try_consume_at(start));

        // 0.5 tokens after one second: still denied, but kept.
        assert!(!bucket.try_consume_at(start + Duration::from_secs(1)));
        assert!(bucket.try_consume_at(start + Duration::from_secs(2)));
    }

    #[test]
    fn test_earlier_instant_does_not_refill() {
        let start = Instant::now() + Duration::from_secs(10);
        let bucket = TokenBucket::starting_at(1, 5.0, start);
        assert!(bucket.try_consume_at(start));

        assert!(!bucket.try_consume_at(start - Duration::from_secs(5)));
        assert_eq!(bucket.tokens(), 0.0);
    }

    #[test]
    fn test_invalid_refill_rate_is_zero() {
        assert_eq!(TokenBucket::new(1, -3.0).refill_rate(), 0.0);
        assert_eq!(TokenBucket::new(1, f64::NAN).refill_rate(), 0.0);
    }

    #[test]
    fn test_tokens_stay_within_bounds() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(5, 2.0, start);
        for step in 0..200u64 {
            let now = start + Duration::from_millis(step * 37);
            bucket.try_consume_at(now);
            bucket.try_consume_at(now);
            let tokens = bucket.tokens();
            assert!((0.0..=5.0).contains(&tokens), "tokens out of range: {}", tokens);
        }
    }

    #[test]
    fn test_concurrent_consumers_never_over_admit() {
        let bucket = TokenBucket::new(100, 0.0);
        let allowed = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        if bucket.try_consume() {
                            allowed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(allowed.load(Ordering::SeqCst), 100);
        assert_eq!(bucket.tokens(), 0.0);
    }

    #[test]
    fn test_limiter_isolates_identities() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, 0.0));

        assert!(limiter.allow("alice"));
        assert!(limiter.allow("alice"));
        assert!(!limiter.allow("alice"));

        assert!(limiter.allow("bob"));
        assert!(limiter.allow("bob"));
        assert!(!limiter.allow("bob"));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_limiter_treats_empty_identity_as_a_key() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 0.0));
        assert!(limiter.allow(""));
        assert!(!limiter.allow(""));
        assert!(limiter.allow("other"));
    }

    #[test]
    fn test_limiter_creates_buckets_lazily() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        assert!(limiter.is_empty());
        limiter.allow("a");
        limiter.allow("a");
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_limiter_concurrent_disjoint_identities() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10, 0.0));
        let identities = ["a", "b", "c", "d"];
        let denials: Vec<AtomicUsize> = identities.iter().map(|_| AtomicUsize::new(0)).collect();

        std::thread::scope(|s| {
            for (idx, identity) in identities.iter().enumerate() {
                for _ in 0..3 {
                    let limiter = &limiter;
                    let denials = &denials;
                    s.spawn(move || {
                        for _ in 0..10 {
                            if !limiter.allow(identity) {
                                denials[idx].fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    });
                }
            }
        });

        // 30 calls per identity against a capacity of 10.
        for count in &denials {
            assert_eq!(count.load(Ordering::SeqCst), 20);
        }
    }
}
