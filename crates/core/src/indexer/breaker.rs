//! Circuit breaker for the aggregator backend.
//!
//! One monotonic "unavailable until" timestamp per upstream: any failure
//! arms the deadline, calls inside the window short-circuit without
//! touching the network.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;

/// Process-wide backoff deadline, updated atomically.
pub struct CircuitBreaker {
    /// Unix millis until which the upstream is considered unavailable.
    /// 0 means closed.
    until_ms: AtomicI64,
    window: Duration,
}

impl CircuitBreaker {
    pub fn new(window: Duration) -> Self {
        Self {
            until_ms: AtomicI64::new(0),
            window,
        }
    }

    /// Whether calls should currently be short-circuited.
    pub fn is_open(&self) -> bool {
        Utc::now().timestamp_millis() < self.until_ms.load(Ordering::Relaxed)
    }

    /// Arm the breaker after a failure.
    pub fn trip(&self) {
        let until = Utc::now().timestamp_millis() + self.window.as_millis() as i64;
        self.until_ms.store(until, Ordering::Relaxed);
        tracing::warn!(
            backoff_secs = self.window.as_secs(),
            "Aggregator failure, backing off"
        );
    }

    /// Clear the deadline (used by config reloads).
    pub fn reset(&self) {
        self.until_ms.store(0, Ordering::Relaxed);
    }
}
