//! A minimal per-dependency circuit breaker, opened to shed load against a
//! failing downstream dependency. Closed lets calls through; after
//! `failure_threshold` consecutive transient failures it opens for
//! `open_duration`; after that it half-opens, letting one probe through.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    consecutive_failures: AtomicU32,
    opened_at_millis: AtomicU64,
    epoch: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            open_duration,
            consecutive_failures: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        let opened_at = self.opened_at_millis.load(Ordering::SeqCst);
        if opened_at == 0 {
            return CircuitState::Closed;
        }
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        if elapsed.saturating_sub(opened_at) >= self.open_duration.as_millis() as u64 {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    /// Whether a call should be let through right now.
    pub fn allow(&self) -> bool {
        !matches!(self.state(), CircuitState::Open)
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.opened_at_millis.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            let now = self.epoch.elapsed().as_millis() as u64;
            self.opened_at_millis.store(now.max(1), Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_and_half_opens_after_duration() {
        let cb = CircuitBreaker::new(3, Duration::from_millis(50));
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow());
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(1));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
