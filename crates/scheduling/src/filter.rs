//! Endpoint-subset filter
//!
//! The gateway can pin a request to a subset of backends through dynamic
//! metadata. The filter is fail-closed: a present-but-empty subset list
//! yields zero candidates and the caller fails the request, rather than
//! silently widening to the whole pool.

use std::collections::HashMap;
use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use llm_inference_director_core::PodMetrics;

use crate::datastore::Datastore;

/// Metadata namespace carrying load-balancer subset hints
pub const SUBSET_HINT_NAMESPACE: &str = "envoy.lb.subset_hint";

/// Metadata key listing `host:port` endpoints the request may use
pub const SUBSET_HINT_KEY: &str = "x-gateway-destination-endpoint-subset";

/// Candidate pods for a request, honoring the subset hint in `metadata`.
///
/// Missing namespace or key: every pod is a candidate. Present key with an
/// empty list: no pod is a candidate. Otherwise only pods whose address
/// appears in the list (ports are ignored when matching).
pub fn subset_filtered_pods(
    metadata: &HashMap<String, Value>,
    datastore: &dyn Datastore,
) -> Vec<PodMetrics> {
    let endpoints = match subset_endpoints(metadata) {
        None => return datastore.pod_get_all(),
        Some(list) => list,
    };

    if endpoints.is_empty() {
        debug!("subset hint present but empty, failing closed");
        return Vec::new();
    }

    let addresses: HashSet<String> = endpoints
        .iter()
        .map(|endpoint| {
            endpoint
                .split(':')
                .next()
                .unwrap_or(endpoint.as_str())
                .to_string()
        })
        .collect();

    datastore.pod_list(&|pod| addresses.contains(&pod.address))
}

// The hint list, or None when the namespace/key is absent or malformed.
fn subset_endpoints(metadata: &HashMap<String, Value>) -> Option<Vec<String>> {
    let namespace = metadata.get(SUBSET_HINT_NAMESPACE)?;
    let values = namespace.get(SUBSET_HINT_KEY)?.as_array()?;
    Some(
        values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}
