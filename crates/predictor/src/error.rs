//! Error types for the latency predictor client

/// Result type alias for predictor operations
pub type Result<T> = std::result::Result<T, PredictorError>;

/// Errors produced by predictor calls.
///
/// Everything here is transient from the request's point of view: the
/// director degrades to a zero-valued observation and continues.
#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    /// Request rejected before leaving the client
    #[error("invalid prediction input: {0}")]
    InvalidInput(String),

    /// HTTP transport failure
    #[error("predictor transport error: {0}")]
    Transport(String),

    /// Predictor returned a non-success status
    #[error("predictor API error: {message} (status: {status_code})")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Response body or status text
        message: String,
    },

    /// Response body did not decode
    #[error("predictor response decode error: {0}")]
    Decode(String),
}

impl PredictorError {
    /// Create an invalid-input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convert a reqwest error, preserving the status when one exists
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            Self::Api {
                status_code: status.as_u16(),
                message: error.to_string(),
            }
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}
