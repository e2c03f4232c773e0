//! Latency-aware request director
//!
//! An external processing extension that sits between an API gateway and a
//! fleet of LLM inference servers. For each gateway stream it selects a
//! backend pod under admission and saturation constraints, rewrites the
//! request to direct it there, measures TTFT and TPOT off the streamed
//! response, feeds an online latency predictor, and splices live telemetry
//! into the outbound SSE stream.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use llm_inference_director::director::{Director, DirectorSettings};
//! use llm_inference_director::metrics::ServiceMetrics;
//! use llm_inference_director_core::{InferencePool, Metrics};
//! use llm_inference_director_predictor::HttpPredictor;
//! use llm_inference_director_scheduling::{
//!     AdmissionController, QueueAwareScheduler, StaticDatastore, ThresholdSaturationDetector,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # fn main() -> anyhow::Result<()> {
//! let datastore = Arc::new(StaticDatastore::new(
//!     InferencePool { name: "default".into(), target_port: 8000 },
//!     Vec::new(),
//! ));
//! datastore.upsert_pod("10.0.0.1", Metrics::default());
//!
//! let director = Arc::new(Director::new(
//!     datastore.clone(),
//!     Arc::new(QueueAwareScheduler::default()),
//!     AdmissionController::new(Arc::new(ThresholdSaturationDetector::with_defaults(
//!         datastore,
//!     ))),
//!     Arc::new(HttpPredictor::new("http://127.0.0.1:8100")?),
//!     Arc::new(ServiceMetrics::new()?),
//!     DirectorSettings::default(),
//! ));
//!
//! let session = director.open_stream(CancellationToken::new());
//! # let _ = session;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod config;
pub mod director;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod sse;

// Re-export core types for convenience
pub use llm_inference_director_core::{
    Criticality, DirectorError, InferenceModel, InferencePool, Metrics, PodMetrics,
    RequestContext, TargetModel, Usage,
};

pub use director::{Director, DirectorSettings, StreamSession};
pub use protocol::{ProcessingRequest, ProcessingResponse};
