//! Pod scheduling

use async_trait::async_trait;
use tracing::debug;

use llm_inference_director_core::{PodMetrics, ProfileResult, SchedulingRequest, SchedulingResult};

/// Profile name the built-in scheduler reports its decision under
pub const PRIMARY_PROFILE: &str = "primary";

/// Default weight applied to each scoring dimension
pub const DEFAULT_SCORER_WEIGHT: f64 = 1.0;

/// Picks a target pod for a request from the candidate set.
///
/// Implementations receive cloned metrics snapshots and must not retain
/// them past the call.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Schedule `request` onto one of `candidates`
    async fn schedule(
        &self,
        request: &SchedulingRequest,
        candidates: Vec<PodMetrics>,
    ) -> anyhow::Result<SchedulingResult>;
}

/// Load-aware scorer over queue depth and KV-cache headroom.
///
/// Each candidate scores `queue_weight / (1 + waiting) + kv_cache_weight *
/// (1 - kv_usage)`; the highest score wins, ties break on address so the
/// decision is stable for a fixed snapshot.
pub struct QueueAwareScheduler {
    queue_weight: f64,
    kv_cache_weight: f64,
}

impl QueueAwareScheduler {
    /// Create a scheduler with explicit scorer weights
    pub fn new(queue_weight: f64, kv_cache_weight: f64) -> Self {
        Self {
            queue_weight,
            kv_cache_weight,
        }
    }

    fn score(&self, pod: &PodMetrics) -> f64 {
        let queue_score = 1.0 / (1.0 + pod.metrics.waiting_queue_size as f64);
        let kv_score = 1.0 - pod.metrics.kv_cache_usage_percent.clamp(0.0, 1.0);
        self.queue_weight * queue_score + self.kv_cache_weight * kv_score
    }
}

impl Default for QueueAwareScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SCORER_WEIGHT, DEFAULT_SCORER_WEIGHT)
    }
}

#[async_trait]
impl Scheduler for QueueAwareScheduler {
    async fn schedule(
        &self,
        request: &SchedulingRequest,
        candidates: Vec<PodMetrics>,
    ) -> anyhow::Result<SchedulingResult> {
        if candidates.is_empty() {
            anyhow::bail!("no candidate pods to schedule onto");
        }

        let mut best: Option<(&PodMetrics, f64)> = None;
        for pod in &candidates {
            let score = self.score(pod);
            let better = match best {
                None => true,
                Some((best_pod, best_score)) => {
                    score > best_score || (score == best_score && pod.address < best_pod.address)
                }
            };
            if better {
                best = Some((pod, score));
            }
        }

        let (pod, score) = best.expect("candidates checked non-empty");
        debug!(
            request_id = %request.request_id,
            target = %pod.address,
            score,
            "scheduled request"
        );

        let mut profile_results = std::collections::HashMap::new();
        profile_results.insert(
            PRIMARY_PROFILE.to_string(),
            ProfileResult {
                target_pod: pod.clone(),
            },
        );
        Ok(SchedulingResult {
            profile_results,
            primary_profile_name: PRIMARY_PROFILE.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_inference_director_core::Metrics;

    fn request() -> SchedulingRequest {
        SchedulingRequest {
            request_id: "req-1".to_string(),
            target_model: "foo".to_string(),
            prompt: "hello world".to_string(),
            headers: Vec::new(),
        }
    }

    fn pod(address: &str, waiting: u64, kv: f64) -> PodMetrics {
        PodMetrics::new(
            address,
            Metrics {
                kv_cache_usage_percent: kv,
                waiting_queue_size: waiting,
                running_queue_size: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_prefers_least_loaded_pod() {
        let scheduler = QueueAwareScheduler::default();
        let result = scheduler
            .schedule(
                &request(),
                vec![
                    pod("10.0.0.1", 8, 0.9),
                    pod("10.0.0.2", 0, 0.1),
                    pod("10.0.0.3", 3, 0.5),
                ],
            )
            .await
            .unwrap();

        let primary = result.primary().unwrap();
        assert_eq!(primary.target_pod.address, "10.0.0.2");
        assert_eq!(result.primary_profile_name, PRIMARY_PROFILE);
    }

    #[tokio::test]
    async fn test_tie_breaks_on_address() {
        let scheduler = QueueAwareScheduler::default();
        let result = scheduler
            .schedule(
                &request(),
                vec![pod("10.0.0.9", 1, 0.3), pod("10.0.0.2", 1, 0.3)],
            )
            .await
            .unwrap();
        assert_eq!(result.primary().unwrap().target_pod.address, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_empty_candidates_is_an_error() {
        let scheduler = QueueAwareScheduler::default();
        assert!(scheduler.schedule(&request(), Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_result_carries_metrics_snapshot() {
        let scheduler = QueueAwareScheduler::default();
        let result = scheduler
            .schedule(&request(), vec![pod("10.0.0.1", 2, 0.4)])
            .await
            .unwrap();
        let snapshot = &result.primary().unwrap().target_pod.metrics;
        assert_eq!(snapshot.waiting_queue_size, 2);
        assert_eq!(snapshot.kv_cache_usage_percent, 0.4);
    }
}
