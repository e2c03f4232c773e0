//! Read-only view of pods, models and the pool
//!
//! The datastore is fed by external watchers; request tasks only ever read
//! it. Every read clones the stored metrics so a scheduling decision works
//! against a stable snapshot even while the watcher keeps writing.

use std::collections::HashMap;
use std::sync::RwLock;

use llm_inference_director_core::{InferenceModel, InferencePool, Metrics, PodMetrics, Result};

/// Read-only snapshot source for pods, model registrations and the pool
pub trait Datastore: Send + Sync {
    /// All pods with cloned metrics snapshots
    fn pod_get_all(&self) -> Vec<PodMetrics>;

    /// Pods matching `predicate`, with cloned metrics snapshots
    fn pod_list(&self, predicate: &dyn Fn(&PodMetrics) -> bool) -> Vec<PodMetrics>;

    /// Registration for a logical model name, if one exists
    fn model_get(&self, name: &str) -> Option<InferenceModel>;

    /// The pool served by this director
    fn pool_get(&self) -> Result<InferencePool>;
}

/// In-memory datastore.
///
/// Stands in for the Kubernetes-backed store in tests and single-process
/// deployments; the pod table is written by whatever feeds metrics in and
/// read under a shared lock by request tasks.
pub struct StaticDatastore {
    pool: InferencePool,
    models: HashMap<String, InferenceModel>,
    pods: RwLock<Vec<PodMetrics>>,
}

impl StaticDatastore {
    /// Create a datastore with the given pool and model registry
    pub fn new(pool: InferencePool, models: Vec<InferenceModel>) -> Self {
        Self {
            pool,
            models: models.into_iter().map(|m| (m.name.clone(), m)).collect(),
            pods: RwLock::new(Vec::new()),
        }
    }

    /// Replace the pod table with a fresh observation
    pub fn set_pods(&self, pods: Vec<PodMetrics>) {
        *self.pods.write().expect("pod table lock poisoned") = pods;
    }

    /// Update the metrics of a single pod, inserting it if unknown
    pub fn upsert_pod(&self, address: impl Into<String>, metrics: Metrics) {
        let address = address.into();
        let mut pods = self.pods.write().expect("pod table lock poisoned");
        match pods.iter_mut().find(|p| p.address == address) {
            Some(pod) => pod.metrics = metrics,
            None => pods.push(PodMetrics::new(address, metrics)),
        }
    }
}

impl Datastore for StaticDatastore {
    fn pod_get_all(&self) -> Vec<PodMetrics> {
        self.pods.read().expect("pod table lock poisoned").clone()
    }

    fn pod_list(&self, predicate: &dyn Fn(&PodMetrics) -> bool) -> Vec<PodMetrics> {
        self.pods
            .read()
            .expect("pod table lock poisoned")
            .iter()
            .filter(|p| predicate(p))
            .cloned()
            .collect()
    }

    fn model_get(&self, name: &str) -> Option<InferenceModel> {
        self.models.get(name).cloned()
    }

    fn pool_get(&self) -> Result<InferencePool> {
        Ok(self.pool.clone())
    }
}

impl StaticDatastore {
    /// Convenience constructor for tests: a pool on the given port with no
    /// registered models
    pub fn with_pool(name: &str, target_port: u16) -> Self {
        Self::new(
            InferencePool {
                name: name.to_string(),
                target_port,
            },
            Vec::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_pods() -> StaticDatastore {
        let store = StaticDatastore::with_pool("pool-a", 8000);
        store.set_pods(vec![
            PodMetrics::new(
                "10.0.0.1",
                Metrics {
                    kv_cache_usage_percent: 0.1,
                    waiting_queue_size: 0,
                    running_queue_size: 1,
                },
            ),
            PodMetrics::new(
                "10.0.0.2",
                Metrics {
                    kv_cache_usage_percent: 0.9,
                    waiting_queue_size: 7,
                    running_queue_size: 4,
                },
            ),
        ]);
        store
    }

    #[test]
    fn test_reads_are_snapshots() {
        let store = store_with_pods();
        let snapshot = store.pod_get_all();

        store.upsert_pod(
            "10.0.0.1",
            Metrics {
                kv_cache_usage_percent: 0.99,
                waiting_queue_size: 50,
                running_queue_size: 9,
            },
        );

        // The earlier snapshot is unaffected by the write.
        assert_eq!(snapshot[0].metrics.kv_cache_usage_percent, 0.1);
        assert_eq!(
            store.pod_get_all()[0].metrics.kv_cache_usage_percent,
            0.99
        );
    }

    #[test]
    fn test_pod_list_filters() {
        let store = store_with_pods();
        let busy = store.pod_list(&|p| p.metrics.waiting_queue_size > 5);
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].address, "10.0.0.2");
    }

    #[test]
    fn test_upsert_inserts_unknown_pod() {
        let store = store_with_pods();
        store.upsert_pod("10.0.0.3", Metrics::default());
        assert_eq!(store.pod_get_all().len(), 3);
    }

    #[test]
    fn test_model_registry_lookup() {
        let store = StaticDatastore::new(
            InferencePool {
                name: "pool-a".to_string(),
                target_port: 8000,
            },
            vec![InferenceModel {
                name: "foo".to_string(),
                criticality: None,
                target_models: Vec::new(),
            }],
        );
        assert!(store.model_get("foo").is_some());
        assert!(store.model_get("bar").is_none());
    }
}
