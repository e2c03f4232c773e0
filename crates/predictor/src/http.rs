//! HTTP adapter for the latency predictor sidecar
//!
//! Speaks the predictor's JSON API: `POST /predict` for single predictions
//! and `POST /add-training-data-bulk` for training submissions. The client
//! validates inputs before they leave the process and clamps negative
//! predicted latencies to zero on the way back in.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PredictorError, Result};
use crate::traits::Predictor;
use crate::types::{Prediction, PredictionRequest, TrainingEntry};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

/// HTTP client for the latency predictor service
pub struct HttpPredictor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPredictor {
    /// Create a client for the given base URL with default settings
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a client with custom configuration
    pub fn builder() -> HttpPredictorBuilder {
        HttpPredictorBuilder::default()
    }

    fn predict_url(&self) -> String {
        format!("{}/predict", self.base_url)
    }

    fn training_url(&self) -> String {
        format!("{}/add-training-data-bulk", self.base_url)
    }
}

/// Builder for [`HttpPredictor`]
#[derive(Default)]
pub struct HttpPredictorBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl HttpPredictorBuilder {
    /// Set the base URL of the predictor service
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<HttpPredictor> {
        let base_url = self
            .base_url
            .ok_or_else(|| PredictorError::invalid_input("predictor base URL is required"))?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(PredictorError::from_reqwest)?;

        Ok(HttpPredictor {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    ttft_ms: f64,
    tpot_ms: f64,
}

#[derive(Debug, Serialize)]
struct BulkTrainingRequest<'a> {
    entries: &'a [TrainingEntry],
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, request: PredictionRequest) -> Result<Prediction> {
        if request.input_token_length < 0 {
            return Err(PredictorError::invalid_input(format!(
                "negative input token length: {}",
                request.input_token_length
            )));
        }

        let response = self
            .client
            .post(self.predict_url())
            .json(&request)
            .send()
            .await
            .map_err(PredictorError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictorError::Api {
                status_code: status.as_u16(),
                message: body,
            });
        }

        let decoded: PredictResponse = response
            .json()
            .await
            .map_err(PredictorError::from_reqwest)?;

        // A model still warming up can emit negative latencies.
        Ok(Prediction {
            ttft_ms: decoded.ttft_ms.max(0.0),
            tpot_ms: decoded.tpot_ms.max(0.0),
        })
    }

    async fn add_training_data_bulk(&self, entries: Vec<TrainingEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        debug!(count = entries.len(), "submitting training entries");

        let response = self
            .client
            .post(self.training_url())
            .json(&BulkTrainingRequest { entries: &entries })
            .send()
            .await
            .map_err(PredictorError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictorError::Api {
                status_code: status.as_u16(),
                message: body,
            });
        }

        Ok(())
    }
}
