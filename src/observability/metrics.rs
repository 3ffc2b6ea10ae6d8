//! Thread-safe metrics collection
//!
//! Atomic counters for the hot path, mutex-protected collections for the
//! per-class failure tally and the processing time window.

use crate::error::ErrorClass;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Processing times kept for percentile calculation
const PROCESSING_TIME_WINDOW: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

pub struct MetricsCollector {
    tasks_submitted: AtomicU64,
    tasks_rejected: AtomicU64,
    tasks_in_flight: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    discarded_writes: AtomicU64,
    specialist_failures: AtomicU64,
    failures_by_class: Mutex<BTreeMap<String, u64>>,
    processing_times: Mutex<Vec<u64>>,
    started_at: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            tasks_rejected: AtomicU64::new(0),
            tasks_in_flight: AtomicU64::new(0),
            tasks_succeeded: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            discarded_writes: AtomicU64::new(0),
            specialist_failures: AtomicU64::new(0),
            failures_by_class: Mutex::new(BTreeMap::new()),
            processing_times: Mutex::new(Vec::new()),
            started_at: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Submission refused before a task was created
    pub fn task_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_started(&self) {
        self.tasks_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_succeeded(&self, duration: Duration) {
        self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        self.finish(duration);
    }

    pub fn task_failed(&self, class: ErrorClass, duration: Duration) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_class) = self.failures_by_class.lock() {
            *by_class.entry(class.as_str().to_string()).or_insert(0) += 1;
        }
        self.finish(duration);
    }

    /// Terminal write dropped because the record was deleted or expired
    pub fn write_discarded(&self) {
        self.discarded_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn specialist_failed(&self) {
        self.specialist_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, duration: Duration) {
        // Saturating: a reset between start and finish must not underflow
        let _ = self
            .tasks_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));

        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);
            if times.len() > PROCESSING_TIME_WINDOW {
                times.remove(0);
            }
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.tasks_submitted,
            &self.tasks_rejected,
            &self.tasks_in_flight,
            &self.tasks_succeeded,
            &self.tasks_failed,
            &self.discarded_writes,
            &self.specialist_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut by_class) = self.failures_by_class.lock() {
            by_class.clear();
        }
        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        self.started_at.store(current_timestamp(), Ordering::Relaxed);
    }

    fn processing_time_statistics(&self) -> ProcessingTimes {
        let sorted = match self.processing_times.lock() {
            Ok(times) if !times.is_empty() => {
                let mut sorted = times.clone();
                sorted.sort_unstable();
                sorted
            }
            _ => return ProcessingTimes::default(),
        };

        ProcessingTimes {
            avg_ms: sorted.iter().sum::<u64>() as f64 / sorted.len() as f64,
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        MetricsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            tasks_in_flight: self.tasks_in_flight.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            failures_by_class: self
                .failures_by_class
                .lock()
                .map(|m| m.clone())
                .unwrap_or_default(),
            discarded_writes: self.discarded_writes.load(Ordering::Relaxed),
            specialist_failures: self.specialist_failures.load(Ordering::Relaxed),
            processing_time: self.processing_time_statistics(),
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingTimes {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_rejected: u64,
    pub tasks_in_flight: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub failures_by_class: BTreeMap<String, u64>,
    pub discarded_writes: u64,
    pub specialist_failures: u64,
    pub processing_time: ProcessingTimes,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Linear interpolation between the closest ranks
fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;
    lower + (upper - lower) * index.fract()
}
