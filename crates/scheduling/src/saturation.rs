//! Pool saturation detection

use std::sync::Arc;

use llm_inference_director_core::PodMetrics;

use crate::datastore::Datastore;

/// Default KV-cache utilization above which a pod counts as saturated
pub const DEFAULT_KV_CACHE_THRESHOLD: f64 = 0.8;

/// Default waiting-queue depth above which a pod counts as saturated
pub const DEFAULT_QUEUE_DEPTH_THRESHOLD: u64 = 5;

/// Saturation signal consulted by the admission controller
pub trait SaturationDetector: Send + Sync {
    /// Whether the pool currently has no capacity for non-critical traffic
    fn is_saturated(&self) -> bool;
}

/// Threshold-based detector over the datastore's pod snapshot.
///
/// The pool is saturated when every pod breaches either the waiting-queue or
/// the KV-cache threshold. An empty pod set is saturated: there is nowhere
/// to send the request.
pub struct ThresholdSaturationDetector {
    datastore: Arc<dyn Datastore>,
    kv_cache_threshold: f64,
    queue_depth_threshold: u64,
}

impl ThresholdSaturationDetector {
    /// Create a detector with explicit thresholds
    pub fn new(
        datastore: Arc<dyn Datastore>,
        kv_cache_threshold: f64,
        queue_depth_threshold: u64,
    ) -> Self {
        Self {
            datastore,
            kv_cache_threshold,
            queue_depth_threshold,
        }
    }

    /// Create a detector with the default thresholds
    pub fn with_defaults(datastore: Arc<dyn Datastore>) -> Self {
        Self::new(
            datastore,
            DEFAULT_KV_CACHE_THRESHOLD,
            DEFAULT_QUEUE_DEPTH_THRESHOLD,
        )
    }

    fn pod_is_saturated(&self, pod: &PodMetrics) -> bool {
        pod.metrics.waiting_queue_size > self.queue_depth_threshold
            || pod.metrics.kv_cache_usage_percent >= self.kv_cache_threshold
    }
}

impl SaturationDetector for ThresholdSaturationDetector {
    fn is_saturated(&self) -> bool {
        let pods = self.datastore.pod_get_all();
        if pods.is_empty() {
            return true;
        }
        pods.iter().all(|pod| self.pod_is_saturated(pod))
    }
}
