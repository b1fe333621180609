//! ═══════════════════════════════════════════════════════════════════════════════
//! RATE LIMIT — Rolling Window + Minimum Spacing for Oracle Calls
//! ═══════════════════════════════════════════════════════════════════════════════
//! At most `max_requests` calls per rolling `window`, and never two calls
//! closer than `min_interval`. `acquire` blocks (via the clock) until both
//! hold. Time is injected so tests never sleep.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock; `sleep` really blocks the thread
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept on; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    min_interval: Duration,
    history: VecDeque<Duration>,
    clock: Box<dyn Clock>,
    total_wait: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, min_interval: Duration, clock: Box<dyn Clock>) -> Self {
        Self {
            max_requests: max_requests.max(1) as usize,
            window,
            min_interval,
            history: VecDeque::new(),
            clock,
            total_wait: Duration::ZERO,
        }
    }

    /// Wait until a call is allowed, then record it. Returns the time waited.
    pub fn acquire(&mut self) -> Duration {
        let mut now = self.clock.now();
        self.prune(now);

        let mut wait = Duration::ZERO;
        if let Some(&last) = self.history.back() {
            wait = wait.max((last + self.min_interval).saturating_sub(now));
        }
        if self.history.len() >= self.max_requests {
            if let Some(&oldest) = self.history.front() {
                wait = wait.max((oldest + self.window).saturating_sub(now));
            }
        }

        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "oracle rate limit, waiting");
            self.clock.sleep(wait);
            self.total_wait += wait;
            now = self.clock.now();
            self.prune(now);
        }

        self.history.push_back(now);
        wait
    }

    /// Calls still inside the rolling window
    pub fn in_window(&self) -> usize {
        self.history.len()
    }

    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }

    fn prune(&mut self, now: Duration) {
        while let Some(&t) = self.history.front() {
            if t + self.window <= now {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("min_interval", &self.min_interval)
            .field("in_window", &self.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(clock: &ManualClock) -> RateLimiter {
        RateLimiter::new(
            5,
            Duration::from_secs(60),
            Duration::from_secs(12),
            Box::new(clock.clone()),
        )
    }

    #[test]
    fn test_first_call_is_free() {
        let clock = ManualClock::new();
        let mut rl = limiter(&clock);
        assert_eq!(rl.acquire(), Duration::ZERO);
        assert_eq!(rl.in_window(), 1);
    }

    #[test]
    fn test_minimum_spacing() {
        let clock = ManualClock::new();
        let mut rl = limiter(&clock);
        rl.acquire();
        clock.advance(Duration::from_secs(5));
        assert_eq!(rl.acquire(), Duration::from_secs(7));
        assert_eq!(clock.now(), Duration::from_secs(12));
    }

    #[test]
    fn test_spaced_calls_do_not_wait() {
        let clock = ManualClock::new();
        let mut rl = limiter(&clock);
        for _ in 0..3 {
            assert_eq!(rl.acquire(), Duration::ZERO);
            clock.advance(Duration::from_secs(20));
        }
    }

    #[test]
    fn test_window_never_exceeded() {
        let clock = ManualClock::new();
        let mut rl = RateLimiter::new(
            5,
            Duration::from_secs(60),
            Duration::ZERO,
            Box::new(clock.clone()),
        );
        let mut stamps = Vec::new();
        for _ in 0..12 {
            rl.acquire();
            stamps.push(clock.now());
        }
        // any 6 consecutive calls span at least a full window
        for w in stamps.windows(6) {
            assert!(w[5] - w[0] >= Duration::from_secs(60));
        }
        assert!(rl.total_wait() >= Duration::from_secs(120));
    }

    #[test]
    fn test_default_limits_pace_at_twelve_seconds() {
        let clock = ManualClock::new();
        let mut rl = limiter(&clock);
        for _ in 0..6 {
            rl.acquire();
        }
        // 5 × 12 s spacing already fills the window exactly
        assert_eq!(clock.now(), Duration::from_secs(60));
    }
}
