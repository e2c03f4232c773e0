//! Configuration management for the inference director
//!
//! Supports loading configuration from:
//! - A TOML file
//! - Environment variables (`EPP_`-prefixed, highest priority below CLI)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use llm_inference_director_core::{Criticality, InferenceModel, InferencePool, TargetModel};

use crate::director::DirectorSettings;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the processing server listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Address the admin server (health, metrics) listens on
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,

    /// Per-chunk byte limit for bodies sent back to the gateway
    #[serde(default = "default_body_byte_limit")]
    pub body_byte_limit: usize,

    /// Token sampling parameters
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Latency predictor connection
    #[serde(default)]
    pub predictor: PredictorConfig,

    /// Saturation thresholds for admission control
    #[serde(default)]
    pub saturation: SaturationConfig,

    /// Scorer weights for the built-in scheduler
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// The inference pool this director serves
    #[serde(default)]
    pub pool: PoolConfig,

    /// Registered logical models
    #[serde(default)]
    pub models: Vec<ModelEntry>,

    /// Seed pod addresses; normally fed by the platform's watchers
    #[serde(default)]
    pub pods: Vec<PodEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_addr: default_admin_addr(),
            body_byte_limit: default_body_byte_limit(),
            sampling: SamplingConfig::default(),
            predictor: PredictorConfig::default(),
            saturation: SaturationConfig::default(),
            scheduler: SchedulerConfig::default(),
            pool: PoolConfig::default(),
            models: Vec::new(),
            pods: Vec::new(),
        }
    }
}

/// Token sampling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Mean token gap between sampled predictions
    #[serde(default = "default_sampling_mean")]
    pub mean: f64,

    /// Cap on sampled predictions per request
    #[serde(default = "default_max_sampled_tokens")]
    pub max_sampled_tokens: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            mean: default_sampling_mean(),
            max_sampled_tokens: default_max_sampled_tokens(),
        }
    }
}

/// Latency predictor connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Base URL of the predictor service
    #[serde(default = "default_predictor_url")]
    pub base_url: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_predictor_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            base_url: default_predictor_url(),
            timeout_ms: default_predictor_timeout_ms(),
        }
    }
}

/// Saturation thresholds for admission control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaturationConfig {
    /// KV-cache utilization at or above which a pod counts as saturated
    #[serde(default = "default_kv_cache_threshold")]
    pub kv_cache_threshold: f64,

    /// Waiting-queue depth above which a pod counts as saturated
    #[serde(default = "default_queue_depth_threshold")]
    pub queue_depth_threshold: u64,
}

impl Default for SaturationConfig {
    fn default() -> Self {
        Self {
            kv_cache_threshold: default_kv_cache_threshold(),
            queue_depth_threshold: default_queue_depth_threshold(),
        }
    }
}

/// Scorer weights for the built-in scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Weight of the queue-depth score
    #[serde(default = "default_scorer_weight")]
    pub queue_weight: f64,

    /// Weight of the KV-cache headroom score
    #[serde(default = "default_scorer_weight")]
    pub kv_cache_weight: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_weight: default_scorer_weight(),
            kv_cache_weight: default_scorer_weight(),
        }
    }
}

/// The inference pool this director serves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name
    #[serde(default = "default_pool_name")]
    pub name: String,

    /// Port every member pod serves inference on
    #[serde(default = "default_target_port")]
    pub target_port: u16,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            target_port: default_target_port(),
        }
    }
}

/// A registered logical model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Logical model name
    pub name: String,

    /// Criticality class; omitted means Standard
    #[serde(default)]
    pub criticality: Option<Criticality>,

    /// Weighted physical targets
    #[serde(default)]
    pub target_models: Vec<TargetModelEntry>,
}

/// One weighted physical target of a logical model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetModelEntry {
    /// Physical model name
    pub name: String,

    /// Relative routing weight; omitted makes the draw uniform
    #[serde(default)]
    pub weight: Option<u32>,
}

/// A seed pod address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodEntry {
    /// Pod address without port
    pub address: String,
}

impl Config {
    /// Load configuration from an optional file, then apply environment
    /// overrides
    pub fn load(config_path: &Option<PathBuf>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse TOML config: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("EPP_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Ok(addr) = std::env::var("EPP_ADMIN_ADDR") {
            self.admin_addr = addr;
        }
        if let Ok(url) = std::env::var("EPP_PREDICTOR_URL") {
            self.predictor.base_url = url;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.body_byte_limit == 0 {
            anyhow::bail!("body_byte_limit must be greater than 0");
        }
        if self.sampling.mean <= 0.0 {
            anyhow::bail!("sampling.mean must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.saturation.kv_cache_threshold) {
            anyhow::bail!("saturation.kv_cache_threshold must be within [0, 1]");
        }
        if self.pool.target_port == 0 {
            anyhow::bail!("pool.target_port must be a valid port");
        }
        if self.predictor.base_url.is_empty() {
            anyhow::bail!("predictor.base_url must not be empty");
        }

        let mut seen = std::collections::HashSet::new();
        for model in &self.models {
            if model.name.is_empty() {
                anyhow::bail!("model entries must have a name");
            }
            if !seen.insert(&model.name) {
                anyhow::bail!("duplicate model entry: {}", model.name);
            }
            for target in &model.target_models {
                if target.name.is_empty() {
                    anyhow::bail!("model {} has a target without a name", model.name);
                }
            }
        }
        Ok(())
    }

    /// Model registrations for the datastore
    pub fn inference_models(&self) -> Vec<InferenceModel> {
        self.models
            .iter()
            .map(|entry| InferenceModel {
                name: entry.name.clone(),
                criticality: entry.criticality,
                target_models: entry
                    .target_models
                    .iter()
                    .map(|t| TargetModel {
                        name: t.name.clone(),
                        weight: t.weight,
                    })
                    .collect(),
            })
            .collect()
    }

    /// The pool descriptor for the datastore
    pub fn inference_pool(&self) -> InferencePool {
        InferencePool {
            name: self.pool.name.clone(),
            target_port: self.pool.target_port,
        }
    }

    /// Director tunables derived from this configuration
    pub fn director_settings(&self) -> DirectorSettings {
        DirectorSettings {
            sampling_mean: self.sampling.mean,
            max_sampled_tokens: self.sampling.max_sampled_tokens,
            body_byte_limit: self.body_byte_limit,
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0:9002".to_string()
}

fn default_admin_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_body_byte_limit() -> usize {
    64 * 1024
}

fn default_sampling_mean() -> f64 {
    50.0
}

fn default_max_sampled_tokens() -> usize {
    50
}

fn default_predictor_url() -> String {
    "http://127.0.0.1:8100".to_string()
}

fn default_predictor_timeout_ms() -> u64 {
    250
}

fn default_kv_cache_threshold() -> f64 {
    0.8
}

fn default_queue_depth_threshold() -> u64 {
    5
}

fn default_scorer_weight() -> f64 {
    1.0
}

fn default_pool_name() -> String {
    "default".to_string()
}

fn default_target_port() -> u16 {
    8000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.body_byte_limit, 64 * 1024);
        assert_eq!(config.sampling.mean, 50.0);
        assert_eq!(config.sampling.max_sampled_tokens, 50);
        assert_eq!(config.saturation.kv_cache_threshold, 0.8);
        assert_eq!(config.saturation.queue_depth_threshold, 5);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_content = r#"
listen_addr = "127.0.0.1:9102"
body_byte_limit = 32768

[sampling]
mean = 25.0

[predictor]
base_url = "http://predictor:8100"
timeout_ms = 100

[pool]
name = "llama-pool"
target_port = 8200

[[models]]
name = "llama"
criticality = "critical"

[[models.target_models]]
name = "llama-7b"
weight = 1

[[models.target_models]]
name = "llama-70b"
weight = 3

[[pods]]
address = "10.0.0.1"
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9102");
        assert_eq!(config.body_byte_limit, 32768);
        assert_eq!(config.sampling.mean, 25.0);
        assert_eq!(config.sampling.max_sampled_tokens, 50);
        assert_eq!(config.pool.target_port, 8200);
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].criticality, Some(Criticality::Critical));
        assert_eq!(config.models[0].target_models.len(), 2);
        assert_eq!(config.pods.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.body_byte_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sampling.mean = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.saturation.kv_cache_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.models = vec![
            ModelEntry {
                name: "dup".to_string(),
                criticality: None,
                target_models: Vec::new(),
            },
            ModelEntry {
                name: "dup".to_string(),
                criticality: None,
                target_models: Vec::new(),
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inference_models_conversion() {
        let mut config = Config::default();
        config.models = vec![ModelEntry {
            name: "foo".to_string(),
            criticality: Some(Criticality::Sheddable),
            target_models: vec![TargetModelEntry {
                name: "foo-v2".to_string(),
                weight: Some(4),
            }],
        }];
        let models = config.inference_models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].criticality, Some(Criticality::Sheddable));
        assert_eq!(models[0].target_models[0].weight, Some(4));
    }
}
