//! Resource model shared by the loader, the checks and the cluster adapters.
//!
//! A [`ResourceDocument`] is one learner-authored manifest. Its body is kept
//! as the raw YAML mapping (document order preserved); typed views are
//! produced on demand with [`ResourceDocument::typed`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Resource kinds the grader knows about.
///
/// Unrecognised kinds are carried through as [`ResourceKind::Other`]: they are
/// loaded and applied, but no kind-specific check ever matches them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    Deployment,
    Service,
    ConfigMap,
    Secret,
    Other(String),
}

impl ResourceKind {
    /// Kind as written in the `kind:` field.
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Other(kind) => kind.as_str(),
        }
    }

    /// `apiVersion` of the built-in kinds; `None` for anything else.
    pub fn default_api_version(&self) -> Option<&'static str> {
        match self {
            ResourceKind::Deployment => Some("apps/v1"),
            ResourceKind::Service | ResourceKind::ConfigMap | ResourceKind::Secret => Some("v1"),
            ResourceKind::Other(_) => None,
        }
    }
}

impl From<&str> for ResourceKind {
    fn from(kind: &str) -> Self {
        match kind {
            "Deployment" => ResourceKind::Deployment,
            "Service" => ResourceKind::Service,
            "ConfigMap" => ResourceKind::ConfigMap,
            "Secret" => ResourceKind::Secret,
            other => ResourceKind::Other(other.to_string()),
        }
    }
}

impl From<String> for ResourceKind {
    fn from(kind: String) -> Self {
        ResourceKind::from(kind.as_str())
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weak reference to a cluster object: kind + namespace + name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} (namespace {})", self.kind, self.name, self.namespace)
    }
}

/// Where a document came from: file path and zero-based index in that file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSource {
    pub path: PathBuf,
    pub index: usize,
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (document {})", self.path.display(), self.index + 1)
    }
}

/// A single declarative configuration document from a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDocument {
    pub kind: ResourceKind,
    pub api_version: Option<String>,
    pub name: String,
    pub namespace: String,
    /// Raw document body, keys in authoring order.
    pub body: Mapping,
    pub source: DocumentSource,
}

impl ResourceDocument {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind.clone(), self.namespace.clone(), self.name.clone())
    }

    /// Deserialize the body into a typed view.
    pub fn typed<T: DeserializeOwned>(&self) -> Result<T, serde_yaml::Error> {
        serde_yaml::from_value(Value::Mapping(self.body.clone()))
    }

    /// JSON form of the body with `metadata.namespace` pinned to the resolved
    /// namespace, ready to hand to the API server.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut body = self.body.clone();
        if let Some(Value::Mapping(metadata)) = body.get_mut("metadata") {
            metadata.insert(
                Value::String("namespace".to_string()),
                Value::String(self.namespace.clone()),
            );
        }
        serde_json::to_value(Value::Mapping(body))
    }
}

/// Equality-based label selector (`matchLabels` semantics).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector(pub BTreeMap<String, String>);

impl LabelSelector {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every selector pair is present in `labels`.
    ///
    /// An empty selector matches nothing, mirroring how an empty Service
    /// selector routes no traffic.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        !self.0.is_empty()
            && self
                .0
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&pairs.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> ResourceDocument {
        let body: Mapping = serde_yaml::from_str(yaml).unwrap();
        ResourceDocument {
            kind: ResourceKind::Deployment,
            api_version: Some("apps/v1".to_string()),
            name: "web".to_string(),
            namespace: "grading".to_string(),
            body,
            source: DocumentSource {
                path: PathBuf::from("deployment.yaml"),
                index: 0,
            },
        }
    }

    #[test]
    fn test_kind_round_trips_through_strings() {
        assert_eq!(ResourceKind::from("Service"), ResourceKind::Service);
        assert_eq!(
            ResourceKind::from("Ingress"),
            ResourceKind::Other("Ingress".to_string())
        );
        assert_eq!(String::from(ResourceKind::ConfigMap), "ConfigMap");
        assert_eq!(ResourceKind::Deployment.default_api_version(), Some("apps/v1"));
        assert_eq!(ResourceKind::Other("Ingress".to_string()).default_api_version(), None);
    }

    #[test]
    fn test_to_json_pins_namespace() {
        let d = doc("apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n");
        let json = d.to_json().unwrap();
        assert_eq!(json["metadata"]["namespace"], "grading");
        assert_eq!(json["metadata"]["name"], "web");
    }

    #[test]
    fn test_selector_matching_and_display() {
        let selector = LabelSelector::new(BTreeMap::from([
            ("app".to_string(), "web".to_string()),
            ("tier".to_string(), "frontend".to_string()),
        ]));
        let mut labels = BTreeMap::from([("app".to_string(), "web".to_string())]);
        assert!(!selector.matches(&labels));
        labels.insert("tier".to_string(), "frontend".to_string());
        assert!(selector.matches(&labels));
        assert_eq!(selector.to_string(), "app=web,tier=frontend");
        assert!(!LabelSelector::default().matches(&labels));
    }
}
