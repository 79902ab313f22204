//! Account-wide concurrency throttling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bounded counter of in-flight invocations. Acquisition is fail-fast: an
/// invocation that cannot get a slot is throttled immediately, it never
/// queues. A per-function reserved-concurrency counter would nest inside the
/// same slot guard, leaving this contract shape unchanged.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    in_flight: AtomicUsize,
    limit: usize,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            limit,
        })
    }

    /// Atomically take a slot. Succeeds iff the post-increment count stays
    /// within the limit; otherwise the counter is left unchanged.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConcurrencySlot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.limit).then_some(current + 1)
            })
            .ok()
            .map(|_| ConcurrencySlot {
                limiter: Arc::clone(self),
            })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "released more slots than acquired");
    }
}

/// An ephemeral reservation against the limiter. Dropping the slot releases
/// it, so every exit path of an invocation (return, fault, timeout, caller
/// cancellation) releases exactly once.
#[derive(Debug)]
pub struct ConcurrencySlot {
    limiter: Arc<ConcurrencyLimiter>,
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_up_to_limit_then_throttle() {
        let limiter = ConcurrencyLimiter::new(2);
        let first = limiter.try_acquire().unwrap();
        let _second = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.in_flight(), 2);

        drop(first);
        assert_eq!(limiter.in_flight(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[test]
    fn failed_acquire_leaves_counter_unchanged() {
        let limiter = ConcurrencyLimiter::new(1);
        let _held = limiter.try_acquire().unwrap();
        for _ in 0..10 {
            assert!(limiter.try_acquire().is_none());
        }
        assert_eq!(limiter.in_flight(), 1);
    }

    #[test]
    fn zero_limit_rejects_everything() {
        let limiter = ConcurrencyLimiter::new(0);
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquires_never_exceed_limit() {
        let limiter = ConcurrencyLimiter::new(8);
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let limiter = Arc::clone(&limiter);
            tasks.push(tokio::spawn(async move {
                let mut admitted = 0usize;
                for _ in 0..100 {
                    if let Some(slot) = limiter.try_acquire() {
                        admitted += 1;
                        assert!(limiter.in_flight() <= limiter.limit());
                        tokio::task::yield_now().await;
                        drop(slot);
                    }
                }
                admitted
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        // Every acquired slot was released.
        assert_eq!(limiter.in_flight(), 0);
    }
}
