//! Rubric checks.
//!
//! Each check is a pure function of the loaded submission and the grading
//! config, returning a [`CheckVerdict`]. The live check additionally takes a
//! pod snapshot and is driven by the poll engine.

pub mod exposure;
pub mod injection;
pub mod live;
pub mod probes;
pub mod replicas;
pub mod resources;
pub mod selector;

use kubegrade_cluster::ResourceDocument;
use serde::de::DeserializeOwned;

use crate::config::GradingConfig;
use crate::domain::outcome::CheckVerdict;
use crate::domain::rubric::CheckKind;
use crate::domain::workload::{Deployment, Service};
use crate::manifest::Submission;

/// Everything a static check may read.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub submission: &'a Submission,
    pub config: &'a GradingConfig,
}

impl<'a> CheckContext<'a> {
    pub fn new(submission: &'a Submission, config: &'a GradingConfig) -> Self {
        Self { submission, config }
    }

    /// The Deployment the workload checks inspect.
    pub fn deployment(&self) -> Result<(&'a ResourceDocument, Deployment), CheckVerdict> {
        let name = self.config.deployment_name.as_deref();
        let doc = self.submission.deployment(name).ok_or_else(|| {
            CheckVerdict::Fail(match name {
                Some(name) => format!("no Deployment named `{name}` in the submission"),
                None => "no Deployment in the submission".to_string(),
            })
        })?;
        Ok((doc, view(doc)?))
    }

    /// The Service the network checks inspect.
    pub fn service(&self) -> Result<(&'a ResourceDocument, Service), CheckVerdict> {
        let name = self.config.service_name.as_deref();
        let doc = self.submission.service(name).ok_or_else(|| {
            CheckVerdict::Fail(match name {
                Some(name) => format!("no Service named `{name}` in the submission"),
                None => "no Service in the submission".to_string(),
            })
        })?;
        Ok((doc, view(doc)?))
    }
}

/// Deserialize a typed view, turning a shape mismatch into an Error verdict.
pub(crate) fn view<T: DeserializeOwned>(doc: &ResourceDocument) -> Result<T, CheckVerdict> {
    doc.typed().map_err(|e| {
        CheckVerdict::Error(format!(
            "{} `{}` in {} has an unexpected shape: {e}",
            doc.kind, doc.name, doc.source
        ))
    })
}

/// Collapse a check body written with `?` on verdicts.
pub(crate) fn settle(result: Result<CheckVerdict, CheckVerdict>) -> CheckVerdict {
    result.unwrap_or_else(|verdict| verdict)
}

/// Evaluate a manifest-only check.
///
/// For [`CheckKind::LiveHealth`] this runs the pre-check only; a passing
/// pre-check means the item is ready to be polled.
pub fn evaluate_static(kind: CheckKind, ctx: &CheckContext<'_>) -> CheckVerdict {
    match kind {
        CheckKind::ReplicaCount => replicas::check(ctx),
        CheckKind::ResourceLimits => resources::check(ctx),
        CheckKind::Probes => probes::check(ctx),
        CheckKind::ServiceSelectorMatch => selector::check(ctx),
        CheckKind::ServiceExposure => exposure::check(ctx),
        CheckKind::ConfigInjection => injection::check_config(ctx),
        CheckKind::SecretInjection => injection::check_secret(ctx),
        CheckKind::LiveHealth => match live::plan(ctx) {
            Ok(plan) => CheckVerdict::Pass(format!(
                "waiting for {} ready pod(s) matching {} in namespace {}",
                plan.min_ready, plan.selector, plan.namespace
            )),
            Err(verdict) => verdict,
        },
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::manifest::{ManifestLoader, Submission};

    /// A submission that satisfies every rubric dimension.
    pub const COMPLETE: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata: {name: app-config}
data:
  APP_MODE: production
  LOG_LEVEL: info
---
apiVersion: v1
kind: Secret
metadata: {name: app-secret}
type: Opaque
data:
  API_KEY: c2VjcmV0LWtleQ==
---
apiVersion: apps/v1
kind: Deployment
metadata: {name: web, labels: {app: web}}
spec:
  replicas: 2
  selector:
    matchLabels: {app: web}
  template:
    metadata:
      labels: {app: web, tier: frontend}
    spec:
      containers:
      - name: app
        image: registry.local/web:1.0
        ports:
        - containerPort: 5000
          name: http
        envFrom:
        - configMapRef: {name: app-config}
        env:
        - name: API_KEY
          valueFrom:
            secretKeyRef: {name: app-secret, key: API_KEY}
        resources:
          requests: {cpu: 100m, memory: 64Mi}
          limits: {cpu: 500m, memory: 128Mi}
        livenessProbe:
          httpGet: {path: /health, port: 5000}
          initialDelaySeconds: 5
          periodSeconds: 10
        readinessProbe:
          httpGet: {path: /health, port: http}
          initialDelaySeconds: 3
          periodSeconds: 5
---
apiVersion: v1
kind: Service
metadata: {name: web}
spec:
  type: NodePort
  selector: {app: web}
  ports:
  - port: 80
    targetPort: 5000
    nodePort: 30080
"#;

    pub fn submission(yaml: &str) -> Submission {
        let docs = ManifestLoader::default()
            .parse_documents(Path::new("submission.yaml"), yaml)
            .expect("fixture parses");
        Submission::from_documents(docs, PathBuf::from(".")).expect("fixture has no duplicates")
    }
}
