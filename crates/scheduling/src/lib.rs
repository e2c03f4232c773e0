//! Pod snapshots, admission control and scheduling
//!
//! Everything between "a parsed request exists" and "a target pod is
//! chosen": the read-only datastore view, the endpoint-subset filter,
//! saturation-based admission, the weighted model router and the scheduler.

pub mod admission;
pub mod datastore;
pub mod filter;
pub mod router;
pub mod saturation;
pub mod scheduler;

pub use admission::AdmissionController;
pub use datastore::{Datastore, StaticDatastore};
pub use filter::{subset_filtered_pods, SUBSET_HINT_KEY, SUBSET_HINT_NAMESPACE};
pub use router::random_weighted_draw;
pub use saturation::{
    SaturationDetector, ThresholdSaturationDetector, DEFAULT_KV_CACHE_THRESHOLD,
    DEFAULT_QUEUE_DEPTH_THRESHOLD,
};
pub use scheduler::{QueueAwareScheduler, Scheduler, DEFAULT_SCORER_WEIGHT, PRIMARY_PROFILE};
