//! Shared per-provider rate limiter.
//!
//! One refill task per provider feeds a single-permit semaphore at a fixed
//! cadence; every outbound call consumes one permit. Concurrent callers
//! contend for permits directly, so the effective call rate is serialized
//! without any mutex on the request path. Permits never accumulate past
//! one: an idle period does not buy a later burst.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub struct RateLimiter {
    permits: Arc<Semaphore>,
    refill_task: JoinHandle<()>,
}

impl RateLimiter {
    /// `period` is the minimum spacing between granted slots, e.g. 1s for a
    /// 1 req/s provider and 500ms for a 2 req/s one.
    pub fn new(period: Duration) -> Self {
        let permits = Arc::new(Semaphore::new(1));
        let refill = Arc::clone(&permits);
        let refill_task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately; skip it
            // so the initial permit is the only one available at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if refill.available_permits() == 0 {
                    refill.add_permits(1);
                }
            }
        });
        Self {
            permits,
            refill_task,
        }
    }

    /// Blocks the calling task until it wins a slot. Waits are expected to
    /// reach seconds-scale under contention.
    pub async fn acquire(&self) {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("limiter semaphore is never closed");
        permit.forget();
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.refill_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    // Each test yields once after construction so the refill task registers
    // its timer before the test moves the paused clock.

    #[tokio::test(start_paused = true)]
    async fn first_slot_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        tokio::task::yield_now().await;
        timeout(Duration::from_millis(10), limiter.acquire())
            .await
            .expect("initial permit should be available");
    }

    #[tokio::test(start_paused = true)]
    async fn second_slot_waits_for_the_cadence() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        tokio::task::yield_now().await;
        limiter.acquire().await;

        // Within the period no slot is granted.
        advance(Duration::from_millis(500)).await;
        assert!(
            timeout(Duration::from_millis(1), limiter.acquire())
                .await
                .is_err(),
            "slot granted before the period elapsed"
        );

        advance(Duration::from_millis(600)).await;
        timeout(Duration::from_millis(10), limiter.acquire())
            .await
            .expect("slot should be granted after the period");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_does_not_accumulate_burst() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        tokio::task::yield_now().await;
        advance(Duration::from_secs(10)).await;
        // Let the refill task drain its idle ticks before we acquire, matching
        // the post-advance yield the other paused-clock tests use.
        tokio::task::yield_now().await;

        limiter.acquire().await;
        // Only one permit despite ten elapsed periods.
        assert!(
            timeout(Duration::from_millis(1), limiter.acquire())
                .await
                .is_err(),
            "idle periods must not stack permits"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1)));
        tokio::task::yield_now().await;
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = Arc::clone(&limiter);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }));
        }

        // t=0: one permit. t=1s, t=2s: one more each.
        tokio::task::yield_now().await;
        advance(Duration::from_millis(1100)).await;
        tokio::task::yield_now().await;
        assert!(counter.load(std::sync::atomic::Ordering::SeqCst) <= 2);

        advance(Duration::from_millis(1100)).await;
        for handle in handles {
            timeout(Duration::from_secs(1), handle)
                .await
                .expect("caller starved past the expected cadence")
                .expect("caller task panicked");
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
