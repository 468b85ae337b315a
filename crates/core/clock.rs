//! Time source shared by the worker loop, admission and the client.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Wall clock plus the ability to wait.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in seconds.
    fn now(&self) -> i64;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// A type-erased clock that can be shared across tasks.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the system time and the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> i64 {
        current_timestamp()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Get current Unix timestamp in seconds.
pub fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock whose time only moves when it sleeps or is advanced.
    #[derive(Debug, Default)]
    pub struct ManualClock {
        now: AtomicI64,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        pub fn at(now: i64) -> Self {
            Self {
                now: AtomicI64::new(now),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        pub fn advance(&self, secs: i64) {
            self.now.fetch_add(secs, Ordering::SeqCst);
        }

        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().push(duration);
            self.advance(duration.as_secs() as i64);
        }
    }
}
