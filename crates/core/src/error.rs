//! Error taxonomy for the request director pipeline

/// Result type alias for director operations
pub type Result<T> = std::result::Result<T, DirectorError>;

/// Errors surfaced to the gateway as an immediate response.
///
/// Transient predictor failures, training-write failures and malformed SSE
/// payloads are recovered locally and never appear here; see the predictor
/// crate and the response rewriter for those paths.
#[derive(Debug, thiserror::Error)]
pub enum DirectorError {
    /// Request body is missing the model or prompt, or is not valid JSON
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Model routing configuration is unusable (e.g. weighted draw over
    /// misconfigured targets)
    #[error("bad configuration: {0}")]
    BadConfiguration(String),

    /// No candidate pods remain after subset filtering
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The inference pool cannot take this request: saturation shedding or a
    /// scheduler failure
    #[error("inference pool resources exhausted: {0}")]
    ResourceExhausted(String),

    /// The scheduling result violated its contract
    #[error("internal error: {0}")]
    Internal(String),
}

impl DirectorError {
    /// Create a bad-request error
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a bad-configuration error
    pub fn bad_configuration<S: Into<String>>(msg: S) -> Self {
        Self::BadConfiguration(msg.into())
    }

    /// Create a service-unavailable error
    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create a resource-exhausted error
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status carried by the immediate response for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::ResourceExhausted(_) => 429,
            Self::ServiceUnavailable(_) => 503,
            Self::BadConfiguration(_) | Self::Internal(_) => 500,
        }
    }
}
