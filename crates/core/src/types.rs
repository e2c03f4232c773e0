//! Request, pod and model types for the director pipeline

use serde::{Deserialize, Serialize};

use crate::sampler::TokenSampler;
use crate::stats::running_average;
use crate::timing::Timestamp;

/// Request criticality class.
///
/// Standard and Sheddable requests are subject to saturation shedding;
/// Critical requests are always admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// Always admitted, never shed
    Critical,
    /// Default class; shed when the pool is saturated
    Standard,
    /// Lowest class; shed when the pool is saturated
    Sheddable,
}

impl Criticality {
    /// Get the criticality name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Critical => "critical",
            Criticality::Standard => "standard",
            Criticality::Sheddable => "sheddable",
        }
    }
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Queue and cache load of a model server pod at one observation point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// KV-cache utilization in [0, 1]
    pub kv_cache_usage_percent: f64,
    /// Requests waiting in the server queue
    pub waiting_queue_size: u64,
    /// Requests currently running
    pub running_queue_size: u64,
}

/// A backend pod together with a cloned metrics snapshot.
///
/// The snapshot is taken when the pod leaves the datastore, so every consumer
/// sees a stable view for the duration of its decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PodMetrics {
    /// Pod address without port
    pub address: String,
    /// Metrics snapshot cloned at read time
    pub metrics: Metrics,
}

impl PodMetrics {
    /// Create a pod with the given address and metrics
    pub fn new(address: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            address: address.into(),
            metrics,
        }
    }
}

/// The inference pool served by this director
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferencePool {
    /// Pool name
    pub name: String,
    /// Port every member pod serves inference on
    pub target_port: u16,
}

/// One physical target of a logical model, with an optional routing weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetModel {
    /// Physical model name served by the backend
    pub name: String,
    /// Relative routing weight; `None` makes the whole draw uniform
    pub weight: Option<u32>,
}

/// A registered logical model and its routing targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceModel {
    /// Logical model name requests arrive with
    pub name: String,
    /// Criticality class; `None` means Standard
    pub criticality: Option<Criticality>,
    /// Weighted physical targets; empty means the logical name is served
    /// directly
    #[serde(default)]
    pub target_models: Vec<TargetModel>,
}

impl InferenceModel {
    /// Synthesize a registration for an unknown model name.
    ///
    /// Unregistered models are treated as sheddable and routed by their own
    /// name.
    pub fn sheddable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            criticality: Some(Criticality::Sheddable),
            target_models: Vec::new(),
        }
    }
}

/// The request handed to the scheduler
#[derive(Debug, Clone)]
pub struct SchedulingRequest {
    /// Request id from the inbound headers
    pub request_id: String,
    /// Resolved physical model name
    pub target_model: String,
    /// Prompt text extracted from the request body
    pub prompt: String,
    /// Inbound request headers
    pub headers: Vec<(String, String)>,
}

/// Per-profile outcome of a scheduling decision
#[derive(Debug, Clone)]
pub struct ProfileResult {
    /// Selected pod with its metrics snapshot
    pub target_pod: PodMetrics,
}

/// Result of a scheduling decision across profiles
#[derive(Debug, Clone)]
pub struct SchedulingResult {
    /// Per-profile results keyed by profile name
    pub profile_results: std::collections::HashMap<String, ProfileResult>,
    /// The profile used for destination selection
    pub primary_profile_name: String,
}

impl SchedulingResult {
    /// Result for the primary profile, if the scheduler produced one
    pub fn primary(&self) -> Option<&ProfileResult> {
        self.profile_results.get(&self.primary_profile_name)
    }
}

/// Token accounting reported by the model server in its `usage` object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens consumed
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens generated
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u64,
}

/// Mutable state of one request, owned by the director task for the stream's
/// lifetime.
///
/// Created when the gateway opens the stream and dropped when it closes;
/// never shared across requests.
pub struct RequestContext {
    /// Request id from `x-request-id`, or generated
    pub request_id: String,
    /// Logical model from the request body
    pub model: String,
    /// Physical model after the weighted draw
    pub resolved_target_model: String,
    /// Prompt text from the request body
    pub prompt: String,
    /// Criticality resolved from the model registration
    pub criticality: Criticality,
    /// Request handed to the scheduler, set once scheduling starts
    pub scheduling_request: Option<SchedulingRequest>,
    /// Scheduler outcome, set iff scheduling succeeded
    pub scheduling_result: Option<SchedulingResult>,
    /// Primary target pod, set iff scheduling succeeded
    pub target_pod: Option<PodMetrics>,
    /// `host:port` of the selected backend, set iff scheduling succeeded
    pub target_endpoint: Option<String>,
    /// Most recent metrics for the target pod; refreshed on response headers
    /// and on every body chunk
    pub last_seen_metrics: Option<Metrics>,
    /// When the stream was opened
    pub request_received_at: Timestamp,
    /// When the most recent output token was observed
    pub last_token_at: Option<Timestamp>,
    /// Measured time to first token, ms; set exactly once
    pub ttft_ms: u64,
    /// Predicted time to first token, ms
    pub predicted_ttft_ms: f64,
    /// Output tokens observed so far
    pub generated_token_count: u64,
    /// Measured inter-token latencies, ms
    pub tpot_observations_ms: Vec<f64>,
    /// Predicted inter-token latencies, ms
    pub predicted_tpot_observations_ms: Vec<f64>,
    /// Running mean of `tpot_observations_ms`
    pub avg_tpot_ms: f64,
    /// Running mean of `predicted_tpot_observations_ms`
    pub avg_predicted_tpot_ms: f64,
    /// Sampler created on the first body chunk
    pub token_sampler: Option<TokenSampler>,
    /// Usage reported by the backend, captured at stream end
    pub usage: Option<Usage>,
    /// Whether the backend signalled completion
    pub response_complete: bool,
    /// Whether the backend responds with an SSE stream; fixed per request
    pub model_server_streaming: bool,
}

impl RequestContext {
    /// Create an empty context stamped with the stream-open time
    pub fn new(received_at: Timestamp) -> Self {
        Self {
            request_id: String::new(),
            model: String::new(),
            resolved_target_model: String::new(),
            prompt: String::new(),
            criticality: Criticality::Standard,
            scheduling_request: None,
            scheduling_result: None,
            target_pod: None,
            target_endpoint: None,
            last_seen_metrics: None,
            request_received_at: received_at,
            last_token_at: None,
            ttft_ms: 0,
            predicted_ttft_ms: 0.0,
            generated_token_count: 0,
            tpot_observations_ms: Vec::new(),
            predicted_tpot_observations_ms: Vec::new(),
            avg_tpot_ms: 0.0,
            avg_predicted_tpot_ms: 0.0,
            token_sampler: None,
            usage: None,
            response_complete: false,
            model_server_streaming: false,
        }
    }

    /// Append a measured inter-token latency and fold it into the running
    /// average
    pub fn push_tpot_observation(&mut self, value_ms: f64) {
        self.tpot_observations_ms.push(value_ms);
        self.avg_tpot_ms = running_average(
            self.avg_tpot_ms,
            value_ms,
            self.tpot_observations_ms.len(),
        );
    }

    /// Append a predicted inter-token latency and fold it into the running
    /// average
    pub fn push_predicted_tpot(&mut self, value_ms: f64) {
        self.predicted_tpot_observations_ms.push(value_ms);
        self.avg_predicted_tpot_ms = running_average(
            self.avg_predicted_tpot_ms,
            value_ms,
            self.predicted_tpot_observations_ms.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Clock;

    #[test]
    fn test_running_averages_track_observations() {
        let clock = Clock::new();
        let mut ctx = RequestContext::new(clock.now());

        for v in [10.0, 20.0, 30.0] {
            ctx.push_tpot_observation(v);
        }
        assert_eq!(ctx.tpot_observations_ms.len(), 3);
        assert!((ctx.avg_tpot_ms - 20.0).abs() < 1e-9);

        ctx.push_predicted_tpot(8.0);
        ctx.push_predicted_tpot(12.0);
        assert!((ctx.avg_predicted_tpot_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_sheddable_synthesis() {
        let model = InferenceModel::sheddable("unknown-model");
        assert_eq!(model.criticality, Some(Criticality::Sheddable));
        assert!(model.target_models.is_empty());
    }

    #[test]
    fn test_usage_parses_with_missing_fields() {
        let usage: Usage = serde_json::from_str(r#"{"prompt_tokens": 3}"#).unwrap();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.completion_tokens, 0);
    }

    #[test]
    fn test_scheduling_result_primary_lookup() {
        let mut profile_results = std::collections::HashMap::new();
        profile_results.insert(
            "default".to_string(),
            ProfileResult {
                target_pod: PodMetrics::new("10.0.0.1", Metrics::default()),
            },
        );
        let result = SchedulingResult {
            profile_results,
            primary_profile_name: "default".to_string(),
        };
        assert!(result.primary().is_some());

        let missing = SchedulingResult {
            profile_results: std::collections::HashMap::new(),
            primary_profile_name: "default".to_string(),
        };
        assert!(missing.primary().is_none());
    }
}
