// Pipeline metrics module
//
// Lightweight counters for the tracking pipeline, shared between the tracking loop,
// the landmark service and the worker strategy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-session pipeline metrics
///
/// Uses atomic operations so the tracking task, the worker context and callers
/// can record without locks. Logged on shutdown or periodically.
#[derive(Debug)]
pub struct TrackingMetrics {
    /// Timer ticks that fired while tracking
    pub ticks_scheduled: AtomicU64,

    /// Ticks skipped by the minimal-tier frame skip
    pub ticks_skipped: AtomicU64,

    /// Frames captured, encoded and sent to detection
    pub frames_processed: AtomicU64,

    /// Ticks where the video handle was not ready yet
    pub frames_not_ready: AtomicU64,

    /// Ticks that failed (capture, encode or worker error)
    pub tick_failures: AtomicU64,

    /// Outbound detector calls
    pub network_calls: AtomicU64,

    /// Detections answered from the content cache
    pub cache_hits: AtomicU64,

    /// Synthetic poses returned instead of a real detection
    pub fallbacks: AtomicU64,

    /// Results that arrived after tracking stopped
    pub results_discarded: AtomicU64,

    /// Worker responses for a frame other than the most recent one
    pub stale_worker_results: AtomicU64,

    /// Poses rejected by the smoother for low shoulder confidence
    pub frames_rejected: AtomicU64,

    /// Placement updates applied to the scene
    pub placements_applied: AtomicU64,

    /// Total time spent inside processed ticks, in milliseconds
    pub total_tick_time_ms: AtomicU64,

    start_time: Instant,
}

impl TrackingMetrics {
    pub fn new() -> Self {
        Self {
            ticks_scheduled: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            frames_not_ready: AtomicU64::new(0),
            tick_failures: AtomicU64::new(0),
            network_calls: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            results_discarded: AtomicU64::new(0),
            stale_worker_results: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            placements_applied: AtomicU64::new(0),
            total_tick_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_tick(&self) {
        self.ticks_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_processed(&self, duration: Duration) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.total_tick_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_not_ready(&self) {
        self.frames_not_ready.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_failure(&self) {
        self.tick_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_network_call(&self) {
        self.network_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.results_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_worker_result(&self) {
        self.stale_worker_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_placement(&self) {
        self.placements_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per processed tick in milliseconds
    pub fn avg_tick_time_ms(&self) -> f64 {
        let total = self.total_tick_time_ms.load(Ordering::Relaxed);
        let count = self.frames_processed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Share of detections answered from cache, 0.0..=1.0
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let calls = self.network_calls.load(Ordering::Relaxed);
        if hits + calls > 0 {
            hits as f64 / (hits + calls) as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Tracking Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Ticks: {} scheduled, {} skipped, {} not ready, {} failed",
            self.ticks_scheduled.load(Ordering::Relaxed),
            self.ticks_skipped.load(Ordering::Relaxed),
            self.frames_not_ready.load(Ordering::Relaxed),
            self.tick_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Frames: {} processed (avg {:.2}ms), {} rejected, {} placements",
            self.frames_processed.load(Ordering::Relaxed),
            self.avg_tick_time_ms(),
            self.frames_rejected.load(Ordering::Relaxed),
            self.placements_applied.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Detection: {} network calls, {} cache hits ({:.0}%), {} fallbacks",
            self.network_calls.load(Ordering::Relaxed),
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_hit_ratio() * 100.0,
            self.fallbacks.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Late results discarded: {}, stale worker results: {}",
            self.results_discarded.load(Ordering::Relaxed),
            self.stale_worker_results.load(Ordering::Relaxed)
        );
    }
}

impl Default for TrackingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = TrackingMetrics::new();
        assert_eq!(metrics.frames_processed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.network_calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = TrackingMetrics::new();

        metrics.record_frame_processed(Duration::from_millis(40));
        metrics.record_frame_processed(Duration::from_millis(60));

        assert_eq!(metrics.total_tick_time_ms.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.avg_tick_time_ms(), 50.0);
    }

    #[test]
    fn test_avg_tick_time_no_frames() {
        let metrics = TrackingMetrics::new();
        assert_eq!(metrics.avg_tick_time_ms(), 0.0);
    }

    #[test]
    fn test_cache_hit_ratio() {
        let metrics = TrackingMetrics::new();
        assert_eq!(metrics.cache_hit_ratio(), 0.0);

        metrics.record_network_call();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();

        assert!((metrics.cache_hit_ratio() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_uptime() {
        let metrics = TrackingMetrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }

    #[test]
    fn test_pipeline_counters() {
        let metrics = TrackingMetrics::new();

        metrics.record_tick();
        metrics.record_tick_skipped();
        metrics.record_not_ready();
        metrics.record_tick_failure();
        metrics.record_fallback();
        metrics.record_discarded();
        metrics.record_stale_worker_result();
        metrics.record_rejected();
        metrics.record_placement();

        assert_eq!(metrics.ticks_scheduled.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.ticks_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.frames_not_ready.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.tick_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.fallbacks.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.results_discarded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.stale_worker_results.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.frames_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.placements_applied.load(Ordering::Relaxed), 1);
    }
}
