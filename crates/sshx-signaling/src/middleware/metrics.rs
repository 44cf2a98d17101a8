//! Request counters for the `/metrics` endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// HTTP-level metrics
#[derive(Default)]
pub struct SignalingMetrics {
    // Request counters
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,

    // Per-endpoint counters
    pub push_requests: AtomicU64,
    pub pull_requests: AtomicU64,

    // Pulls currently parked on a slot
    pub pulls_waiting: AtomicU64,

    // Latency tracking
    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

impl SignalingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished request
    pub fn record_request(&self, success: bool, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push(&self) {
        self.push_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pull entering its wait. The returned guard marks it finished on drop,
    /// including when the client disconnects mid-wait.
    pub fn pull_started(&self) -> PullGuard<'_> {
        self.pull_requests.fetch_add(1, Ordering::Relaxed);
        self.pulls_waiting.fetch_add(1, Ordering::Relaxed);
        PullGuard { metrics: self }
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests": {
                "total": self.requests_total.load(Ordering::Relaxed),
                "success": self.requests_success.load(Ordering::Relaxed),
                "error": self.requests_error.load(Ordering::Relaxed),
                "push": self.push_requests.load(Ordering::Relaxed),
                "pull": self.pull_requests.load(Ordering::Relaxed),
            },
            "pulls_waiting": self.pulls_waiting.load(Ordering::Relaxed),
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Decrements the waiting-pull gauge on drop
pub struct PullGuard<'a> {
    metrics: &'a SignalingMetrics,
}

impl Drop for PullGuard<'_> {
    fn drop(&mut self) {
        self.metrics.pulls_waiting.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Request timer helper
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request() {
        let metrics = SignalingMetrics::new();

        metrics.record_request(true, 10);
        metrics.record_request(false, 30);

        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.requests_success.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_error.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.average_latency_ms(), 20.0);
    }

    #[test]
    fn test_pull_guard() {
        let metrics = SignalingMetrics::new();
        {
            let _a = metrics.pull_started();
            let _b = metrics.pull_started();
            assert_eq!(metrics.pulls_waiting.load(Ordering::Relaxed), 2);
        }
        assert_eq!(metrics.pulls_waiting.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.pull_requests.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_to_json() {
        let metrics = SignalingMetrics::new();
        metrics.record_push();
        let json = metrics.to_json();
        assert_eq!(json["requests"]["push"], 1);
        assert_eq!(json["latency"]["average_ms"], 0.0);
    }
}
