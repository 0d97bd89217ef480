//! Per-endpoint circuit breaker.
//!
//! State lives in a single atomic word plus an atomic next-retry timestamp;
//! every transition is a compare-and-swap. In particular the open→half-open
//! transition is won by exactly one caller per cooldown — there is no
//! read-lock-then-write-lock window to race through.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    /// Monotonic nanoseconds (since `epoch`) after which an open breaker
    /// admits one probe.
    next_retry_ns: AtomicU64,
    /// Consecutive trips, drives the exponential cooldown.
    trip_count: AtomicU32,
    failure_threshold: u32,
    base_cooldown: Duration,
    max_cooldown: Duration,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, base_cooldown: Duration, max_cooldown: Duration) -> Self {
        Self {
            state: AtomicU8::new(CLOSED),
            consecutive_failures: AtomicU32::new(0),
            next_retry_ns: AtomicU64::new(0),
            trip_count: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            base_cooldown,
            max_cooldown: max_cooldown.max(base_cooldown),
            epoch: Instant::now(),
        }
    }

    /// Whether a call may proceed right now. While open, the first caller
    /// past the retry deadline wins the CAS into half-open and probes; all
    /// others fail fast until the probe resolves.
    pub fn try_acquire(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            CLOSED => true,
            HALF_OPEN => false,
            _open => {
                if self.now_ns() < self.next_retry_ns.load(Ordering::Acquire) {
                    return false;
                }
                self.state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.trip_count.store(0, Ordering::Release);
        self.state.store(CLOSED, Ordering::Release);
    }

    pub fn record_failure(&self) {
        match self.state.load(Ordering::Acquire) {
            HALF_OPEN => self.trip(),
            CLOSED => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.failure_threshold {
                    self.trip();
                }
            }
            _ => {}
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    fn trip(&self) {
        let trips = self.trip_count.fetch_add(1, Ordering::AcqRel);
        let cooldown = self
            .base_cooldown
            .saturating_mul(2u32.saturating_pow(trips))
            .min(self.max_cooldown);
        // Deadline first, then state: a racer that sees OPEN must also see
        // a deadline in the future.
        self.next_retry_ns
            .store(self.now_ns() + cooldown.as_nanos() as u64, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        self.state.store(OPEN, Ordering::Release);
    }

    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_millis(50), Duration::from_secs(5))
    }

    #[test]
    fn opens_after_threshold() {
        let b = breaker();
        assert!(b.try_acquire());
        b.record_failure();
        b.record_failure();
        assert!(b.try_acquire());
        b.record_failure();
        assert!(b.is_open());
        assert!(!b.try_acquire());
    }

    #[test]
    fn success_resets_failure_streak() {
        let b = breaker();
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert!(!b.is_open());
    }

    #[test]
    fn half_open_probe_after_cooldown() {
        let b = breaker();
        for _ in 0..3 {
            b.record_failure();
        }
        assert!(!b.try_acquire());

        std::thread::sleep(Duration::from_millis(60));
        // One probe admitted, the rest still rejected.
        assert!(b.try_acquire());
        assert!(!b.try_acquire());

        b.record_success();
        assert!(b.try_acquire());
    }

    #[test]
    fn failed_probe_reopens_with_longer_cooldown() {
        let b = breaker();
        for _ in 0..3 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(b.try_acquire());
        b.record_failure();
        assert!(b.is_open());

        // The base cooldown has elapsed but the doubled one has not.
        std::thread::sleep(Duration::from_millis(60));
        assert!(!b.try_acquire());
        std::thread::sleep(Duration::from_millis(60));
        assert!(b.try_acquire());
    }

    #[test]
    fn exactly_one_thread_wins_half_open() {
        let b = Arc::new(breaker());
        for _ in 0..3 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = b.clone();
                std::thread::spawn(move || b.try_acquire())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
