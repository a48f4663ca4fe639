use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Bot counters, logged on every heartbeat
#[derive(Debug, Default)]
pub struct Metrics {
    uptime_sec: AtomicU64,
    events_total: AtomicU64,
    events_failed: AtomicU64,
    predictions: AtomicU64,
    results: AtomicU64,
    forwards_sent: AtomicU64,
    forwards_failed: AtomicU64,
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MetricsSnapshot {
    pub uptime_sec: u64,
    pub events_total: u64,
    pub events_failed: u64,
    pub predictions: u64,
    pub results: u64,
    pub forwards_sent: u64,
    pub forwards_failed: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an inbound event that was handled
    pub fn record_event(&self) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an inbound event dropped because of a failure
    pub fn record_failure(&self) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction(&self) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result(&self) {
        self.results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward(&self, ok: bool) {
        if ok {
            self.forwards_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.forwards_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Increment uptime (called every heartbeat interval)
    pub fn increment_uptime(&self, seconds: u64) {
        self.uptime_sec.fetch_add(seconds, Ordering::Relaxed);
    }

    /// Get failure rate as percentage
    pub fn failure_rate(&self) -> f64 {
        let total = self.events_total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        (self.events_failed.load(Ordering::Relaxed) as f64 / total as f64) * 100.0
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_sec: self.uptime_sec.load(Ordering::Relaxed),
            events_total: self.events_total.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            results: self.results.load(Ordering::Relaxed),
            forwards_sent: self.forwards_sent.load(Ordering::Relaxed),
            forwards_failed: self.forwards_failed.load(Ordering::Relaxed),
        }
    }
}
