//! Latency predictor client
//!
//! A thin, failure-isolated adapter to the remote latency predictor service.
//! The predictor sits on the request hot path, so callers are expected to
//! bound every call with their own cancellation token; this crate never
//! retries and never blocks longer than the configured HTTP timeout.

pub mod error;
pub mod http;
pub mod traits;
pub mod types;

pub use error::{PredictorError, Result};
pub use http::{HttpPredictor, HttpPredictorBuilder};
pub use traits::Predictor;
pub use types::{Prediction, PredictionRequest, TrainingEntry};
