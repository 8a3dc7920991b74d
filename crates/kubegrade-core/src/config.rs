//! Grading configuration.
//!
//! Every option has a default, so an empty file (or no file at all) yields
//! the standard grading run. Option names in YAML are camelCase and durations
//! are written in seconds:
//!
//! ```yaml
//! minReplicas: 2
//! pollInterval: 2
//! timeout: 60
//! minReadyPods: 2
//! deadline: 300
//! probePath: /health
//! expectedImage: k8s-challenge-app
//! servicePort: 80
//! targetPort: 5000
//! requireNodePort: true
//! weights:
//!   live_health: 20
//!   service_exposure: 5
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{GradeError, Result};

/// Options recognised by a grading run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingConfig {
    /// Namespace for documents that do not set `metadata.namespace`.
    pub namespace: String,
    /// Minimum `spec.replicas` for the ReplicaCount check.
    pub min_replicas: u32,
    /// Spacing between attempts of a live check.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Maximum total wait per live check.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Ready pods required by the LiveHealth check.
    pub min_ready_pods: u32,
    /// Overall budget for the whole grading run.
    #[serde(with = "duration_secs")]
    pub deadline: Duration,
    /// Points needed for the run to count as passed.
    pub pass_threshold: u32,
    /// Attempts per document when apply hits a connectivity error.
    pub apply_attempts: u32,
    #[serde(with = "duration_secs")]
    pub apply_backoff: Duration,
    /// Cap on concurrently polled items; defaults to one slot per live item.
    pub max_concurrent_polls: Option<usize>,
    /// Deployment the workload checks target; first Deployment when unset.
    pub deployment_name: Option<String>,
    /// Service the network checks target; first Service when unset.
    pub service_name: Option<String>,
    /// Required `httpGet.path` for both probes.
    pub probe_path: Option<String>,
    /// Substring every container image must contain.
    pub expected_image: Option<String>,
    /// Required Service `spec.type`, e.g. `NodePort`.
    pub service_type: Option<String>,
    /// Service `port` that must be declared.
    pub service_port: Option<u16>,
    /// Container port the `servicePort` entry must route to.
    pub target_port: Option<u16>,
    /// Every Service port must pin a `nodePort`.
    pub require_node_port: bool,
    /// Keys the injected ConfigMap must define.
    pub required_config_keys: Vec<String>,
    /// Keys that must not be left in an injected ConfigMap.
    pub forbidden_config_keys: Vec<String>,
    /// Required Secret `type`; an absent type counts as `Opaque`.
    pub secret_type: Option<String>,
    /// Per-item weight overrides keyed by rubric item id.
    pub weights: BTreeMap<String, u32>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            min_replicas: 2,
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
            min_ready_pods: 2,
            deadline: Duration::from_secs(300),
            pass_threshold: 100,
            apply_attempts: 3,
            apply_backoff: Duration::from_secs(1),
            max_concurrent_polls: None,
            deployment_name: None,
            service_name: None,
            probe_path: None,
            expected_image: None,
            service_type: None,
            service_port: None,
            target_port: None,
            require_node_port: false,
            required_config_keys: Vec::new(),
            forbidden_config_keys: vec!["PLACEHOLDER".to_string()],
            secret_type: None,
            weights: BTreeMap::new(),
        }
    }
}

impl GradingConfig {
    /// Parse a YAML config document and validate it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: GradingConfig = if yaml.trim().is_empty() {
            GradingConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML config file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Reject option combinations a grading run cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(GradeError::InvalidConfig("pollInterval must be positive".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(GradeError::InvalidConfig("timeout must be positive".to_string()));
        }
        if self.deadline.is_zero() {
            return Err(GradeError::InvalidConfig("deadline must be positive".to_string()));
        }
        if self.apply_attempts == 0 {
            return Err(GradeError::InvalidConfig("applyAttempts must be at least 1".to_string()));
        }
        if self.max_concurrent_polls == Some(0) {
            return Err(GradeError::InvalidConfig(
                "maxConcurrentPolls must be at least 1".to_string(),
            ));
        }
        if self.target_port.is_some() && self.service_port.is_none() {
            return Err(GradeError::InvalidConfig(
                "targetPort requires servicePort".to_string(),
            ));
        }
        if self.namespace.trim().is_empty() {
            return Err(GradeError::InvalidConfig("namespace must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Serde helper: `Duration` as (fractional) seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() == 0 {
            serializer.serialize_u64(value.as_secs())
        } else {
            serializer.serialize_f64(value.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(D::Error::custom(format!(
                "expected a non-negative number of seconds, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("{secs} seconds: {e}")))
    }
}
