//! Metrics Collection for Webhook Router Observability
//!
//! This module provides production-ready metrics collection with:
//! - Atomic counters for deliveries, rejections, and forward outcomes
//! - Memory-efficient histograms for duration percentiles
//! - Prometheus-compatible text format export
//!
//! # Example
//!
//! ```rust,no_run
//! use paystack_router::metrics::global_metrics;
//! use std::time::Duration;
//!
//! // Record an acknowledged delivery
//! global_metrics().record_delivery("charge.success", Duration::from_millis(12));
//!
//! // Get Prometheus output
//! let output = global_metrics().to_prometheus_format();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, Instant};

/// Maximum number of duration samples to keep in each histogram
/// This provides a good balance between memory usage and accuracy
const MAX_HISTOGRAM_SAMPLES: usize = 1000;

/// Metrics collection for webhook router observability
///
/// Thread-safe metrics collector using atomics and RwLocks for
/// high-performance concurrent access.
#[derive(Debug)]
pub struct Metrics {
    // === Counters ===
    /// Total number of deliveries acknowledged end to end
    pub deliveries_total: AtomicU64,
    /// Total number of deliveries rejected for signature failures
    pub rejected_total: AtomicU64,
    /// Total number of signature-valid deliveries dropped as unparseable
    pub unprocessable_total: AtomicU64,
    /// Total number of soft failures absorbed by the pipeline
    pub soft_failures_total: AtomicU64,
    /// Total number of forward series completed
    pub forwards_total: AtomicU64,
    /// Total number of forward series that exhausted all attempts
    pub forward_failures_total: AtomicU64,

    // === Histograms (memory-efficient ring buffers) ===
    /// End-to-end delivery durations for percentile calculation
    delivery_durations: RwLock<RingBuffer<Duration>>,
    /// Forward series durations, including backoff
    forward_durations: RwLock<RingBuffer<Duration>>,

    // === Labeled counters (for detailed breakdowns) ===
    /// Deliveries broken down by event kind
    deliveries_by_kind: RwLock<HashMap<String, u64>>,
    /// Soft failures broken down by pipeline stage
    soft_failures_by_stage: RwLock<HashMap<String, u64>>,
    /// Forward series broken down by attempts used
    forwards_by_attempts: RwLock<HashMap<u32, u64>>,

    // === Timing ===
    /// When metrics collection started
    start_time: RwLock<Option<Instant>>,
}

/// Memory-efficient ring buffer for histogram samples
#[derive(Debug)]
struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    /// Position of next write (wraps around)
    write_pos: usize,
    /// Total samples received (may exceed capacity)
    total_samples: u64,
}

impl<T: Clone + Ord> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
            total_samples: 0,
        }
    }

    fn push(&mut self, value: T) {
        if self.data.len() < self.capacity {
            self.data.push(value);
        } else {
            self.data[self.write_pos] = value;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.total_samples += 1;
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Get a sorted copy of all samples (for percentile calculation)
    fn sorted_samples(&self) -> Vec<T> {
        let mut sorted = self.data.clone();
        sorted.sort();
        sorted
    }

    /// Calculate percentile (0.0 to 1.0)
    fn percentile(&self, p: f64) -> Option<T> {
        if self.data.is_empty() {
            return None;
        }
        let sorted = self.sorted_samples();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted.get(idx).cloned()
    }
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Cannot use `const fn` due to RwLock containing non-const operations
    pub fn new() -> Self {
        Self {
            deliveries_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
            unprocessable_total: AtomicU64::new(0),
            soft_failures_total: AtomicU64::new(0),
            forwards_total: AtomicU64::new(0),
            forward_failures_total: AtomicU64::new(0),
            delivery_durations: RwLock::new(RingBuffer::new(MAX_HISTOGRAM_SAMPLES)),
            forward_durations: RwLock::new(RingBuffer::new(MAX_HISTOGRAM_SAMPLES)),
            deliveries_by_kind: RwLock::new(HashMap::new()),
            soft_failures_by_stage: RwLock::new(HashMap::new()),
            forwards_by_attempts: RwLock::new(HashMap::new()),
            start_time: RwLock::new(None),
        }
    }

    /// Record an acknowledged delivery with its end-to-end duration
    pub fn record_delivery(&self, kind: &str, duration: Duration) {
        self.deliveries_total.fetch_add(1, Ordering::Relaxed);

        // Update delivery histogram
        if let Ok(mut durations) = self.delivery_durations.write() {
            durations.push(duration);
        }

        // Update kind breakdown
        if let Ok(mut breakdown) = self.deliveries_by_kind.write() {
            *breakdown.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a delivery rejected at the signature gate
    pub fn record_rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a signature-valid delivery dropped as unparseable
    pub fn record_unprocessable(&self) {
        self.unprocessable_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a soft failure by pipeline stage
    pub fn record_soft_failure(&self, stage: &str) {
        self.soft_failures_total.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut breakdown) = self.soft_failures_by_stage.write() {
            *breakdown.entry(stage.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a completed forward series
    pub fn record_forward(&self, ok: bool, attempts: u32, duration: Duration) {
        self.forwards_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.forward_failures_total.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut durations) = self.forward_durations.write() {
            durations.push(duration);
        }

        if let Ok(mut breakdown) = self.forwards_by_attempts.write() {
            *breakdown.entry(attempts).or_insert(0) += 1;
        }
    }

    /// Convert metrics to Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        // Counters
        output.push_str(&format!(
            "paystack_router_deliveries_total {}\n",
            self.deliveries_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "paystack_router_rejected_total {}\n",
            self.rejected_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "paystack_router_unprocessable_total {}\n",
            self.unprocessable_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "paystack_router_soft_failures_total {}\n",
            self.soft_failures_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "paystack_router_forwards_total {}\n",
            self.forwards_total.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "paystack_router_forward_failures_total {}\n",
            self.forward_failures_total.load(Ordering::Relaxed)
        ));

        // Uptime
        if let Ok(start_time) = self.start_time.read() {
            if let Some(started) = *start_time {
                output.push_str(&format!(
                    "paystack_router_uptime_seconds {}\n",
                    started.elapsed().as_secs()
                ));
            }
        }

        // Labeled breakdowns, sorted for stable output
        if let Ok(breakdown) = self.deliveries_by_kind.read() {
            let mut entries: Vec<_> = breakdown.iter().collect();
            entries.sort();
            for (kind, count) in entries {
                output.push_str(&format!(
                    "paystack_router_deliveries_by_kind{{kind=\"{kind}\"}} {count}\n"
                ));
            }
        }
        if let Ok(breakdown) = self.soft_failures_by_stage.read() {
            let mut entries: Vec<_> = breakdown.iter().collect();
            entries.sort();
            for (stage, count) in entries {
                output.push_str(&format!(
                    "paystack_router_soft_failures_by_stage{{stage=\"{stage}\"}} {count}\n"
                ));
            }
        }
        if let Ok(breakdown) = self.forwards_by_attempts.read() {
            let mut entries: Vec<_> = breakdown.iter().collect();
            entries.sort();
            for (attempts, count) in entries {
                output.push_str(&format!(
                    "paystack_router_forwards_by_attempts{{attempts=\"{attempts}\"}} {count}\n"
                ));
            }
        }

        // Histogram metrics (simple percentile calculation)
        if let Ok(durations) = self.delivery_durations.read() {
            if durations.len() > 0 {
                if let Some(p50) = durations.percentile(0.5) {
                    output.push_str(&format!(
                        "paystack_router_delivery_duration_p50_ms {}\n",
                        p50.as_millis()
                    ));
                }
                if let Some(p95) = durations.percentile(0.95) {
                    output.push_str(&format!(
                        "paystack_router_delivery_duration_p95_ms {}\n",
                        p95.as_millis()
                    ));
                }
                if let Some(p99) = durations.percentile(0.99) {
                    output.push_str(&format!(
                        "paystack_router_delivery_duration_p99_ms {}\n",
                        p99.as_millis()
                    ));
                }
            }
        }
        if let Ok(durations) = self.forward_durations.read() {
            if durations.len() > 0 {
                if let Some(p50) = durations.percentile(0.5) {
                    output.push_str(&format!(
                        "paystack_router_forward_duration_p50_ms {}\n",
                        p50.as_millis()
                    ));
                }
                if let Some(p99) = durations.percentile(0.99) {
                    output.push_str(&format!(
                        "paystack_router_forward_duration_p99_ms {}\n",
                        p99.as_millis()
                    ));
                }
            }
        }

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance for the router
///
/// Use this for recording metrics throughout the codebase:
/// ```rust,ignore
/// use paystack_router::metrics::global_metrics;
/// global_metrics().record_rejected();
/// ```
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get or initialize the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Initialize global metrics (call once at startup)
pub fn init() {
    let _ = METRICS.get_or_init(Metrics::new);

    // Initialize start time
    if let Ok(mut start_time) = global_metrics().start_time.write() {
        *start_time = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_delivery("charge.success", Duration::from_millis(10));
        assert_eq!(metrics.deliveries_total.load(Ordering::Relaxed), 1);

        metrics.record_rejected();
        assert_eq!(metrics.rejected_total.load(Ordering::Relaxed), 1);

        metrics.record_soft_failure("recording");
        assert_eq!(metrics.soft_failures_total.load(Ordering::Relaxed), 1);

        metrics.record_forward(false, 3, Duration::from_millis(900));
        assert_eq!(metrics.forwards_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.forward_failures_total.load(Ordering::Relaxed), 1);

        metrics.record_unprocessable();
        assert_eq!(metrics.unprocessable_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_format_includes_breakdowns() {
        let metrics = Metrics::new();
        metrics.record_delivery("charge.success", Duration::from_millis(5));
        metrics.record_delivery("charge.success", Duration::from_millis(7));
        metrics.record_delivery("invoice.create", Duration::from_millis(3));
        metrics.record_soft_failure("forward_logging");
        metrics.record_forward(true, 2, Duration::from_millis(320));

        let output = metrics.to_prometheus_format();
        assert!(output.contains("paystack_router_deliveries_total 3\n"));
        assert!(output.contains("paystack_router_deliveries_by_kind{kind=\"charge.success\"} 2\n"));
        assert!(output.contains("paystack_router_deliveries_by_kind{kind=\"invoice.create\"} 1\n"));
        assert!(
            output.contains("paystack_router_soft_failures_by_stage{stage=\"forward_logging\"} 1\n")
        );
        assert!(output.contains("paystack_router_forwards_by_attempts{attempts=\"2\"} 1\n"));
        assert!(output.contains("paystack_router_delivery_duration_p50_ms"));
    }

    #[test]
    fn test_ring_buffer_wraps_without_losing_count() {
        let mut buffer = RingBuffer::new(8);
        for i in 0..20u64 {
            buffer.push(i);
        }

        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.total_samples(), 20);
        // Oldest samples are overwritten, newest survive
        assert_eq!(buffer.percentile(1.0), Some(19));
    }

    #[test]
    fn test_empty_percentile_is_none() {
        let buffer: RingBuffer<u64> = RingBuffer::new(8);
        assert_eq!(buffer.percentile(0.5), None);
    }

    #[test]
    fn test_global_metrics() {
        init();

        let before = global_metrics().rejected_total.load(Ordering::Relaxed);
        global_metrics().record_rejected();

        // Other tests share the global instance, so only assert monotonicity
        assert!(global_metrics().rejected_total.load(Ordering::Relaxed) > before);
        assert!(global_metrics()
            .to_prometheus_format()
            .contains("paystack_router_uptime_seconds"));
    }
}
