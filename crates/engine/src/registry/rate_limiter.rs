//! Sliding-window rate limiter for analysis providers.
//!
//! Every provider gets a log of recent call timestamps. A call is allowed
//! when fewer than `quota.calls` calls were recorded within the last
//! `quota.window`. Checking and recording happen under the provider's own
//! lock, so concurrent requests can never overshoot a quota.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::clock::Clock;
use crate::provider::RateQuota;

/// Upper bound on the call log preallocated per provider.
const MAX_PREALLOCATED_CALLS: usize = 256;

/// Call log for a single provider.
#[derive(Debug)]
struct Window {
    quota: RateQuota,
    /// Call timestamps in milliseconds, oldest first.
    calls: VecDeque<i64>,
}

impl Window {
    fn new(quota: RateQuota) -> Self {
        Self {
            quota,
            calls: VecDeque::with_capacity((quota.calls as usize).min(MAX_PREALLOCATED_CALLS)),
        }
    }

    /// Forget calls that slid out of the window.
    fn prune(&mut self, now_ms: i64) {
        let window = self.quota.window_ms as i64;
        while let Some(&oldest) = self.calls.front() {
            if now_ms - oldest >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn remaining(&mut self, now_ms: i64) -> u32 {
        self.prune(now_ms);
        self.quota.calls.saturating_sub(self.calls.len() as u32)
    }

    fn try_acquire(&mut self, now_ms: i64) -> bool {
        if self.remaining(now_ms) == 0 {
            return false;
        }
        self.calls.push_back(now_ms);
        true
    }
}

/// Per-provider sliding-window rate limiter.
///
/// The provider set is fixed at construction. Providers the limiter does not
/// know about are not limited.
pub struct RateLimiter {
    windows: HashMap<String, Mutex<Window>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new<I>(quotas: I, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = (String, RateQuota)>,
    {
        Self {
            windows: quotas
                .into_iter()
                .map(|(provider, quota)| (provider, Mutex::new(Window::new(quota))))
                .collect(),
            clock,
        }
    }

    /// Lock one provider's window, recovering from poison if necessary.
    ///
    /// A poisoned window at worst miscounts a few calls.
    fn lock(&self, provider: &str) -> Option<MutexGuard<'_, Window>> {
        self.windows.get(provider).map(|window| {
            window.lock().unwrap_or_else(|poisoned| {
                warn!("Rate limiter window for '{}' was poisoned, recovering", provider);
                poisoned.into_inner()
            })
        })
    }

    /// Atomically check the quota and record a call.
    ///
    /// Returns false when the provider's window is full.
    pub fn try_acquire(&self, provider: &str) -> bool {
        let now = self.clock.now_millis();
        match self.lock(provider) {
            Some(mut window) => {
                let acquired = window.try_acquire(now);
                if !acquired {
                    debug!("Rate limiter: quota exhausted for '{}'", provider);
                }
                acquired
            }
            None => true,
        }
    }

    /// Calls left in the current window without recording one.
    /// `None` for providers the limiter does not track.
    pub fn remaining(&self, provider: &str) -> Option<u32> {
        let now = self.clock.now_millis();
        self.lock(provider).map(|mut window| window.remaining(now))
    }

    pub fn has_quota(&self, provider: &str) -> bool {
        self.remaining(provider).map_or(true, |left| left > 0)
    }

    /// Clear a provider's call log.
    pub fn reset(&self, provider: &str) {
        if let Some(mut window) = self.lock(provider) {
            window.calls.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;

    fn limiter(clock: Arc<ManualClock>, calls: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            [(
                "P1".to_string(),
                RateQuota::new(calls, Duration::from_secs(window_secs)),
            )],
            clock,
        )
    }

    #[test]
    fn test_quota_is_enforced() {
        let clock = Arc::new(ManualClock::at_epoch());
        let limiter = limiter(clock, 3, 60);

        for _ in 0..3 {
            assert!(limiter.try_acquire("P1"));
        }
        assert!(!limiter.try_acquire("P1"));
        assert_eq!(limiter.remaining("P1"), Some(0));
    }

    #[test]
    fn test_window_slides() {
        let clock = Arc::new(ManualClock::at_epoch());
        let limiter = limiter(clock.clone(), 2, 60);

        assert!(limiter.try_acquire("P1"));
        clock.advance(Duration::from_secs(30));
        assert!(limiter.try_acquire("P1"));
        assert!(!limiter.try_acquire("P1"));

        // first call leaves the window, second is still inside
        clock.advance(Duration::from_secs(30));
        assert_eq!(limiter.remaining("P1"), Some(1));
        assert!(limiter.try_acquire("P1"));
        assert!(!limiter.try_acquire("P1"));
    }

    #[test]
    fn test_unknown_provider_is_not_limited() {
        let clock = Arc::new(ManualClock::at_epoch());
        let limiter = limiter(clock, 1, 60);

        assert!(limiter.try_acquire("OTHER"));
        assert!(limiter.try_acquire("OTHER"));
        assert_eq!(limiter.remaining("OTHER"), None);
        assert!(limiter.has_quota("OTHER"));
    }

    #[test]
    fn test_huge_quota_does_not_preallocate() {
        let clock = Arc::new(ManualClock::at_epoch());
        let limiter = limiter(clock, u32::MAX, 60);

        assert!(limiter.try_acquire("P1"));
        assert_eq!(limiter.remaining("P1"), Some(u32::MAX - 1));
        let window = limiter.lock("P1").unwrap();
        assert!(window.calls.capacity() <= 2 * MAX_PREALLOCATED_CALLS);
    }

    #[test]
    fn test_reset() {
        let clock = Arc::new(ManualClock::at_epoch());
        let limiter = limiter(clock, 1, 60);

        assert!(limiter.try_acquire("P1"));
        assert!(!limiter.has_quota("P1"));

        limiter.reset("P1");
        assert!(limiter.try_acquire("P1"));
    }

    #[test]
    fn test_concurrent_acquire_never_overshoots() {
        let clock = Arc::new(ManualClock::at_epoch());
        let limiter = Arc::new(limiter(clock, 10, 60));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..5).filter(|_| limiter.try_acquire("P1")).count())
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 10);
    }
}
