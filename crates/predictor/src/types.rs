//! Wire types for the latency predictor service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Feature vector for one prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Target pod KV-cache utilization in [0, 1]
    pub kv_cache_percentage: f64,
    /// Whitespace-token length of the prompt
    pub input_token_length: i64,
    /// Requests waiting at the target pod
    pub num_request_waiting: i64,
    /// Requests running at the target pod
    pub num_request_running: i64,
    /// Output tokens generated so far; 0 for TTFT predictions
    pub num_tokens_generated: i64,
}

/// Predicted latencies returned by the service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted time to first token, ms
    pub ttft_ms: f64,
    /// Predicted time per output token, ms
    pub tpot_ms: f64,
}

/// One observed sample submitted for online training.
///
/// A sample describes either a TTFT or a TPOT observation, never both:
/// TTFT entries carry `actual_tpot_ms = 0` and `num_tokens_generated = 0`,
/// TPOT entries carry `actual_ttft_ms = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingEntry {
    /// Target pod KV-cache utilization in [0, 1]
    pub kv_cache_percentage: f64,
    /// Whitespace-token length of the prompt
    pub input_token_length: i64,
    /// Requests waiting at the target pod
    pub num_request_waiting: i64,
    /// Requests running at the target pod
    pub num_request_running: i64,
    /// Tokens generated before this observation
    pub num_tokens_generated: i64,
    /// Measured TTFT, ms; 0 for TPOT entries
    pub actual_ttft_ms: f64,
    /// Measured inter-token latency, ms; 0 for TTFT entries
    pub actual_tpot_ms: f64,
    /// Wall-clock time of the observation
    pub timestamp: DateTime<Utc>,
}

impl TrainingEntry {
    /// Build a TTFT sample from the features observed at first-token time
    pub fn ttft(features: PredictionRequest, actual_ttft_ms: f64) -> Self {
        Self {
            kv_cache_percentage: features.kv_cache_percentage,
            input_token_length: features.input_token_length,
            num_request_waiting: features.num_request_waiting,
            num_request_running: features.num_request_running,
            num_tokens_generated: 0,
            actual_ttft_ms,
            actual_tpot_ms: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Build a TPOT sample.
    ///
    /// `tokens_before` is the generated-token count minus one, the number of
    /// tokens that preceded the measured gap.
    pub fn tpot(features: PredictionRequest, actual_tpot_ms: f64, tokens_before: i64) -> Self {
        Self {
            kv_cache_percentage: features.kv_cache_percentage,
            input_token_length: features.input_token_length,
            num_request_waiting: features.num_request_waiting,
            num_request_running: features.num_request_running,
            num_tokens_generated: tokens_before,
            actual_ttft_ms: 0.0,
            actual_tpot_ms,
            timestamp: Utc::now(),
        }
    }

    /// Whether this entry describes a TTFT observation
    pub fn is_ttft(&self) -> bool {
        self.actual_ttft_ms > 0.0
    }
}
