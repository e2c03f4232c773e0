//! Core types and per-request state for the inference director
//!
//! This crate provides the request context, the error taxonomy shared by the
//! director pipeline, monotonic timing, and the per-request token sampler.

pub mod error;
pub mod sampler;
pub mod stats;
pub mod timing;
pub mod types;

pub use error::{DirectorError, Result};
pub use sampler::{seed_from_request_id, TokenSampler, DEFAULT_SAMPLING_MEAN, MAX_SAMPLED_TOKENS};
pub use stats::running_average;
pub use timing::{Clock, Timestamp};
pub use types::*;
