// Worker metrics
//
// Lightweight counters for the task pipeline, logged when the pool shuts down

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Task pipeline metrics.
///
/// Uses atomic operations so worker threads can record without locks.
#[derive(Debug)]
pub struct Metrics {
    /// Tasks accepted onto the queue
    pub tasks_enqueued: AtomicUsize,

    /// Tasks processed successfully
    pub tasks_processed: AtomicUsize,

    /// Tasks whose processing returned an error or panicked
    pub tasks_failed: AtomicUsize,

    /// Tasks left unprocessed because debug mode is on
    pub tasks_skipped: AtomicUsize,

    /// Total processing time in milliseconds
    pub total_processing_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_enqueued: AtomicUsize::new(0),
            tasks_processed: AtomicUsize::new(0),
            tasks_failed: AtomicUsize::new(0),
            tasks_skipped: AtomicUsize::new(0),
            total_processing_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_enqueued(&self) {
        self.tasks_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self, duration: Duration) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.tasks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average processing time per successful task in milliseconds
    pub fn avg_processing_time_ms(&self) -> f64 {
        let total = self.total_processing_time_ms.load(Ordering::Relaxed);
        let count = self.tasks_processed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Task Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} enqueued, {} processed, {} failed, {} skipped",
            self.tasks_enqueued.load(Ordering::Relaxed),
            self.tasks_processed.load(Ordering::Relaxed),
            self.tasks_failed.load(Ordering::Relaxed),
            self.tasks_skipped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total processing time: {:.2}s (avg: {:.2}ms per task)",
            self.total_processing_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_processing_time_ms()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
