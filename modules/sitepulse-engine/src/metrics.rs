//! Engine counters. Atomic operations only — the hot path never takes a
//! lock to record an outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct EngineMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_min_ms: AtomicU64,
    duration_max_ms: AtomicU64,
    started_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub in_flight: u64,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
    pub avg_duration: Option<Duration>,
    pub throughput_per_sec: f64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            duration_total_ms: AtomicU64::new(0),
            duration_min_ms: AtomicU64::new(u64::MAX),
            duration_max_ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

impl EngineMetrics {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finished(&self, success: bool, duration: Duration) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let ms = duration.as_millis() as u64;
        self.duration_total_ms.fetch_add(ms, Ordering::Relaxed);
        self.duration_min_ms.fetch_min(ms, Ordering::Relaxed);
        self.duration_max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let submitted = self.submitted.load(Ordering::Relaxed);
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let rejected = self.rejected.load(Ordering::Relaxed);
        let finished = completed + failed;

        let min = self.duration_min_ms.load(Ordering::Relaxed);
        let max = self.duration_max_ms.load(Ordering::Relaxed);
        let total = self.duration_total_ms.load(Ordering::Relaxed);

        let uptime = self.started_at.elapsed().as_secs_f64().max(1e-6);

        MetricsSnapshot {
            submitted,
            completed,
            failed,
            rejected,
            in_flight: submitted.saturating_sub(finished + rejected),
            min_duration: (finished > 0).then(|| Duration::from_millis(min)),
            max_duration: (finished > 0).then(|| Duration::from_millis(max)),
            avg_duration: (finished > 0).then(|| Duration::from_millis(total / finished)),
            throughput_per_sec: finished as f64 / uptime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounting_balances() {
        let m = EngineMetrics::default();
        for _ in 0..5 {
            m.record_submitted();
        }
        m.record_rejected();
        // Only 4 made it into the queue; 3 finish now, 1 stays in flight.
        m.record_finished(true, Duration::from_millis(100));
        m.record_finished(true, Duration::from_millis(300));
        m.record_finished(false, Duration::from_millis(50));

        let s = m.snapshot();
        assert_eq!(s.submitted, 5);
        assert_eq!(s.completed, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.rejected, 1);
        assert_eq!(s.in_flight, 1);
        assert_eq!(s.submitted, s.completed + s.failed + s.in_flight + s.rejected);
    }

    #[test]
    fn duration_bounds() {
        let m = EngineMetrics::default();
        m.record_submitted();
        m.record_submitted();
        m.record_finished(true, Duration::from_millis(20));
        m.record_finished(true, Duration::from_millis(80));

        let s = m.snapshot();
        assert_eq!(s.min_duration, Some(Duration::from_millis(20)));
        assert_eq!(s.max_duration, Some(Duration::from_millis(80)));
        assert_eq!(s.avg_duration, Some(Duration::from_millis(50)));
        assert!(s.throughput_per_sec > 0.0);
    }

    #[test]
    fn empty_snapshot_has_no_durations() {
        let s = EngineMetrics::default().snapshot();
        assert_eq!(s.min_duration, None);
        assert_eq!(s.max_duration, None);
        assert_eq!(s.avg_duration, None);
    }
}
