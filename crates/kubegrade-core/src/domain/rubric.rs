//! Rubric definitions: which dimensions are scored and how much each is worth.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::GradingConfig;
use crate::domain::error::{GradeError, Result};

/// Points a complete rubric is expected to add up to.
pub const CONVENTIONAL_TOTAL: u32 = 100;

/// The check a rubric item runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    ReplicaCount,
    ResourceLimits,
    Probes,
    ServiceSelectorMatch,
    ServiceExposure,
    ConfigInjection,
    SecretInjection,
    LiveHealth,
}

impl CheckKind {
    /// Every check, in standard rubric order.
    pub const ALL: [CheckKind; 8] = [
        CheckKind::ReplicaCount,
        CheckKind::ResourceLimits,
        CheckKind::Probes,
        CheckKind::ServiceSelectorMatch,
        CheckKind::ServiceExposure,
        CheckKind::ConfigInjection,
        CheckKind::SecretInjection,
        CheckKind::LiveHealth,
    ];

    /// Stable identifier used in reports and weight overrides.
    pub fn id(&self) -> &'static str {
        match self {
            CheckKind::ReplicaCount => "replica_count",
            CheckKind::ResourceLimits => "resource_limits",
            CheckKind::Probes => "probes",
            CheckKind::ServiceSelectorMatch => "service_selector",
            CheckKind::ServiceExposure => "service_exposure",
            CheckKind::ConfigInjection => "config_injection",
            CheckKind::SecretInjection => "secret_injection",
            CheckKind::LiveHealth => "live_health",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::ReplicaCount => "Deployment runs enough replicas",
            CheckKind::ResourceLimits => "Containers declare resource requests and limits",
            CheckKind::Probes => "Containers declare liveness and readiness probes",
            CheckKind::ServiceSelectorMatch => "Service selector matches pod labels",
            CheckKind::ServiceExposure => "Service ports route to container ports",
            CheckKind::ConfigInjection => "ConfigMap injected into a container",
            CheckKind::SecretInjection => "Secret injected by key reference",
            CheckKind::LiveHealth => "Pods become ready in the cluster",
        }
    }

    pub fn default_weight(&self) -> u32 {
        match self {
            CheckKind::ReplicaCount => 10,
            CheckKind::ResourceLimits => 15,
            CheckKind::Probes => 15,
            CheckKind::ServiceSelectorMatch => 15,
            CheckKind::ServiceExposure => 10,
            CheckKind::ConfigInjection => 10,
            CheckKind::SecretInjection => 10,
            CheckKind::LiveHealth => 15,
        }
    }

    /// Whether the check observes live cluster state and must be polled.
    pub fn is_live(&self) -> bool {
        matches!(self, CheckKind::LiveHealth)
    }
}

/// One independently scored dimension.
///
/// Immutable once built: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricItem {
    id: String,
    label: String,
    weight: u32,
    check: CheckKind,
    #[serde(with = "crate::config::duration_secs")]
    timeout: Duration,
    #[serde(with = "crate::config::duration_secs")]
    poll_interval: Duration,
}

impl RubricItem {
    pub fn new(check: CheckKind, weight: u32, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            id: check.id().to_string(),
            label: check.label().to_string(),
            weight,
            check,
            timeout,
            poll_interval,
        }
    }

    /// Same item under a different identifier, for rubrics that score one
    /// check more than once.
    pub fn with_id(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.id = id.into();
        self.label = label.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn check(&self) -> CheckKind {
        self.check
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_live(&self) -> bool {
        self.check.is_live()
    }
}

/// Ordered set of rubric items for one grading run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    items: Vec<RubricItem>,
}

impl Rubric {
    /// Build a rubric; item ids must be unique and the weights must sum
    /// within `u32`.
    ///
    /// Weights are expected to add up to [`CONVENTIONAL_TOTAL`]; other totals
    /// are accepted with a warning.
    pub fn new(items: Vec<RubricItem>) -> Result<Self> {
        if items.is_empty() {
            return Err(GradeError::InvalidRubric("rubric has no items".to_string()));
        }
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.id.as_str()) {
                return Err(GradeError::InvalidRubric(format!(
                    "duplicate rubric item id `{}`",
                    item.id
                )));
            }
            if item.is_live() && item.poll_interval.is_zero() {
                return Err(GradeError::InvalidRubric(format!(
                    "live item `{}` needs a non-zero poll interval",
                    item.id
                )));
            }
        }

        let total = checked_total(&items)
            .ok_or_else(|| GradeError::InvalidRubric("rubric weights overflow".to_string()))?;
        if total != CONVENTIONAL_TOTAL {
            warn!(total, expected = CONVENTIONAL_TOTAL, "rubric weights do not add up to the conventional total");
        }
        Ok(Self { items })
    }

    /// The standard rubric: every [`CheckKind`], default weights unless
    /// overridden in `config.weights`, timing from the config.
    pub fn standard(config: &GradingConfig) -> Result<Self> {
        for id in config.weights.keys() {
            if !CheckKind::ALL.iter().any(|k| k.id() == id) {
                return Err(GradeError::InvalidConfig(format!(
                    "weight override for unknown rubric item `{id}`"
                )));
            }
        }

        let items = CheckKind::ALL
            .iter()
            .map(|kind| {
                let weight = config
                    .weights
                    .get(kind.id())
                    .copied()
                    .unwrap_or_else(|| kind.default_weight());
                RubricItem::new(*kind, weight, config.timeout, config.poll_interval)
            })
            .collect::<Vec<_>>();
        if checked_total(&items).is_none() {
            return Err(GradeError::InvalidConfig(format!(
                "weight overrides add up to more than {}",
                u32::MAX
            )));
        }
        Self::new(items)
    }

    pub fn items(&self) -> &[RubricItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&RubricItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Sum of all weights; cannot overflow since construction checks it.
    pub fn total_weight(&self) -> u32 {
        self.items.iter().map(|i| i.weight).sum()
    }

    pub fn has_live_items(&self) -> bool {
        self.items.iter().any(RubricItem::is_live)
    }

    /// Rubric restricted to manifest-only checks, for grading without a
    /// cluster.
    pub fn static_only(&self) -> Result<Self> {
        let items: Vec<RubricItem> = self.items.iter().filter(|i| !i.is_live()).cloned().collect();
        if items.is_empty() {
            return Err(GradeError::InvalidRubric(
                "rubric has no manifest-only items".to_string(),
            ));
        }
        Ok(Self { items })
    }
}

fn checked_total(items: &[RubricItem]) -> Option<u32> {
    items.iter().try_fold(0u32, |acc, i| acc.checked_add(i.weight))
}
