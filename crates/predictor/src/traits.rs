//! Predictor trait definition

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Prediction, PredictionRequest, TrainingEntry};

/// Client contract for the remote latency predictor.
///
/// Implementations must be safe for concurrent calls from many request
/// tasks. `predict` is latency-critical and the caller imposes its own
/// deadline through the ambient cancellation token; `add_training_data_bulk`
/// is fire-and-forget from the hot path's perspective and its errors are
/// only ever logged.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Predict TTFT and TPOT for the given feature vector
    async fn predict(&self, request: PredictionRequest) -> Result<Prediction>;

    /// Submit observed samples for online training
    async fn add_training_data_bulk(&self, entries: Vec<TrainingEntry>) -> Result<()>;
}
