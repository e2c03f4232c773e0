//! Service metrics
//!
//! Prometheus counters and histograms for the director's own behavior:
//! routing outcomes, shed requests, predictor health and measured latencies.
//! Metrics live in an owned registry rather than the process-global default;
//! each director instance exposes its own.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
};

use llm_inference_director_core::{DirectorError, RequestContext};

const LATENCY_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Prometheus metrics for one director instance
pub struct ServiceMetrics {
    registry: Registry,
    requests_routed: IntCounter,
    requests_rejected: IntCounterVec,
    requests_completed: IntCounter,
    predictor_errors: IntCounter,
    training_submitted: IntCounter,
    training_errors: IntCounter,
    ttft_ms: Histogram,
    avg_tpot_ms: Histogram,
}

impl ServiceMetrics {
    /// Create and register the metric set
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_routed = IntCounter::with_opts(Opts::new(
            "director_requests_routed_total",
            "Requests scheduled onto a backend pod",
        ))?;
        let requests_rejected = IntCounterVec::new(
            Opts::new(
                "director_requests_rejected_total",
                "Requests rejected before reaching a backend",
            ),
            &["reason"],
        )?;
        let requests_completed = IntCounter::with_opts(Opts::new(
            "director_requests_completed_total",
            "Requests whose response stream completed",
        ))?;
        let predictor_errors = IntCounter::with_opts(Opts::new(
            "director_predictor_errors_total",
            "Failed latency prediction calls",
        ))?;
        let training_submitted = IntCounter::with_opts(Opts::new(
            "director_training_entries_total",
            "Training entries accepted by the predictor",
        ))?;
        let training_errors = IntCounter::with_opts(Opts::new(
            "director_training_errors_total",
            "Failed training submissions",
        ))?;
        let ttft_ms = Histogram::with_opts(
            HistogramOpts::new(
                "director_ttft_milliseconds",
                "Measured time to first token",
            )
            .buckets(LATENCY_BUCKETS_MS.to_vec()),
        )?;
        let avg_tpot_ms = Histogram::with_opts(
            HistogramOpts::new(
                "director_avg_tpot_milliseconds",
                "Per-request mean time per output token",
            )
            .buckets(LATENCY_BUCKETS_MS.to_vec()),
        )?;

        registry.register(Box::new(requests_routed.clone()))?;
        registry.register(Box::new(requests_rejected.clone()))?;
        registry.register(Box::new(requests_completed.clone()))?;
        registry.register(Box::new(predictor_errors.clone()))?;
        registry.register(Box::new(training_submitted.clone()))?;
        registry.register(Box::new(training_errors.clone()))?;
        registry.register(Box::new(ttft_ms.clone()))?;
        registry.register(Box::new(avg_tpot_ms.clone()))?;

        Ok(Self {
            registry,
            requests_routed,
            requests_rejected,
            requests_completed,
            predictor_errors,
            training_submitted,
            training_errors,
            ttft_ms,
            avg_tpot_ms,
        })
    }

    /// The registry backing these metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A request was scheduled onto a pod
    pub fn observe_routed(&self) {
        self.requests_routed.inc();
    }

    /// A request was rejected with a surfaced error
    pub fn observe_rejected(&self, error: &DirectorError) {
        self.requests_rejected
            .with_label_values(&[rejection_reason(error)])
            .inc();
    }

    /// A response stream completed; record its measured latencies
    pub fn observe_completed(&self, ctx: &RequestContext) {
        self.requests_completed.inc();
        if ctx.ttft_ms > 0 {
            self.ttft_ms.observe(ctx.ttft_ms as f64);
        }
        if !ctx.tpot_observations_ms.is_empty() {
            self.avg_tpot_ms.observe(ctx.avg_tpot_ms);
        }
    }

    /// A prediction call failed
    pub fn observe_predictor_error(&self) {
        self.predictor_errors.inc();
    }

    /// A training submission succeeded
    pub fn observe_training_submitted(&self) {
        self.training_submitted.inc();
    }

    /// A training submission failed
    pub fn observe_training_error(&self) {
        self.training_errors.inc();
    }

    /// Current rejected-request count for a reason label
    pub fn rejected_count(&self, reason: &str) -> u64 {
        self.requests_rejected.with_label_values(&[reason]).get()
    }

    /// Current routed-request count
    pub fn routed_count(&self) -> u64 {
        self.requests_routed.get()
    }
}

fn rejection_reason(error: &DirectorError) -> &'static str {
    match error {
        DirectorError::BadRequest(_) => "bad_request",
        DirectorError::BadConfiguration(_) => "bad_configuration",
        DirectorError::ServiceUnavailable(_) => "service_unavailable",
        DirectorError::ResourceExhausted(_) => "resource_exhausted",
        DirectorError::Internal(_) => "internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_inference_director_core::Clock;

    #[test]
    fn test_counters_track_outcomes() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.observe_routed();
        metrics.observe_routed();
        metrics.observe_rejected(&DirectorError::resource_exhausted("saturated"));

        assert_eq!(metrics.routed_count(), 2);
        assert_eq!(metrics.rejected_count("resource_exhausted"), 1);
        assert_eq!(metrics.rejected_count("bad_request"), 0);
    }

    #[test]
    fn test_completed_skips_empty_latencies() {
        let metrics = ServiceMetrics::new().unwrap();
        let ctx = RequestContext::new(Clock::new().now());
        metrics.observe_completed(&ctx);
        assert_eq!(metrics.ttft_ms.get_sample_count(), 0);
        assert_eq!(metrics.requests_completed.get(), 1);
    }

    #[test]
    fn test_separate_instances_do_not_collide() {
        let a = ServiceMetrics::new().unwrap();
        let b = ServiceMetrics::new().unwrap();
        a.observe_routed();
        assert_eq!(a.routed_count(), 1);
        assert_eq!(b.routed_count(), 0);
    }
}
