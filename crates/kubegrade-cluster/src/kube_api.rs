//! `ClusterClient` backed by the Kubernetes API through `kube`.
//!
//! Documents are sent with server-side apply under the `kubegrade` field
//! manager. Kinds are resolved once per client through API discovery and
//! cached; pods are listed with a typed `Api<Pod>`. Failures are classified
//! from the HTTP status the API server returns, never from message text.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::config::{Config, KubeConfigOptions};
use kube::core::{ErrorResponse, GroupVersionKind};
use kube::discovery::{self, ApiCapabilities, ApiResource, Discovery, Scope};
use kube::Client;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cluster_traits::{
    AppliedResource, ApplyAction, ClusterClient, ClusterResult, PodState, ResourceState,
};
use crate::error::ClusterError;
use crate::resource::{LabelSelector, ResourceDocument, ResourceKind, ResourceRef};

/// Field manager recorded on every object kubegrade applies.
pub const FIELD_MANAGER: &str = "kubegrade";

type Resolved = (ApiResource, ApiCapabilities);

/// Cluster client talking to the API server directly.
#[derive(Clone)]
pub struct KubeApiClient {
    client: Client,
    call_timeout: Duration,
    resources: Arc<RwLock<HashMap<(String, String), Resolved>>>,
}

impl std::fmt::Debug for KubeApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeApiClient")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl KubeApiClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            call_timeout: Duration::from_secs(30),
            resources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Connect using the named kubeconfig context, or the inferred
    /// configuration (`$KUBECONFIG`, `~/.kube/config`, in-cluster) when
    /// `context` is `None`.
    pub async fn connect(context: Option<&str>) -> ClusterResult<Self> {
        let config = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..KubeConfigOptions::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| ClusterError::Config(format!("context {context}: {e}")))?
            }
            None => Config::infer()
                .await
                .map_err(|e| ClusterError::Config(e.to_string()))?,
        };
        debug!(cluster_url = %config.cluster_url, "connecting to cluster");
        let client = Client::try_from(config).map_err(|e| ClusterError::Config(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// Upper bound on a single API call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    async fn within<T>(&self, call: impl Future<Output = kube::Result<T>>) -> ClusterResult<kube::Result<T>> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| {
                ClusterError::Connectivity(format!(
                    "API server did not answer within {}s",
                    self.call_timeout.as_secs()
                ))
            })
    }

    /// Look up how the cluster serves `kind` in `api_version`.
    ///
    /// `Ok(None)` means the cluster does not serve that kind.
    async fn resolve(&self, kind: &ResourceKind, api_version: &str) -> ClusterResult<Option<Resolved>> {
        let key = (api_version.to_string(), kind.as_str().to_string());
        if let Some(found) = self.resources.read().await.get(&key) {
            return Ok(Some(found.clone()));
        }

        let gvk = gvk_for(api_version, kind.as_str());
        let resolved = match self.within(discovery::pinned_kind(&self.client, &gvk)).await? {
            Ok(resolved) => resolved,
            Err(kube::Error::Discovery(e)) => {
                debug!(kind = %kind, api_version, error = %e, "kind not served");
                return Ok(None);
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => return Ok(None),
            Err(e) => {
                let reference = ResourceRef::new(kind.clone(), "", "");
                return Err(classify(e, &reference));
            }
        };
        self.resources.write().await.insert(key, resolved.clone());
        Ok(Some(resolved))
    }

    /// Find the preferred version of a kind known only by name.
    async fn search(&self, kind: &ResourceKind) -> ClusterResult<Option<Resolved>> {
        let key = (String::new(), kind.as_str().to_string());
        if let Some(found) = self.resources.read().await.get(&key) {
            return Ok(Some(found.clone()));
        }

        let reference = ResourceRef::new(kind.clone(), "", "");
        let discovery = self
            .within(Discovery::new(self.client.clone()).run())
            .await?
            .map_err(|e| classify(e, &reference))?;
        let found = discovery
            .groups()
            .flat_map(|group| group.recommended_resources())
            .find(|(ar, _)| ar.kind == kind.as_str());
        if let Some(resolved) = &found {
            self.resources.write().await.insert(key, resolved.clone());
        }
        Ok(found)
    }

    async fn api_for(&self, kind: &ResourceKind, namespace: &str) -> ClusterResult<Api<DynamicObject>> {
        let resolved = match kind.default_api_version() {
            Some(api_version) => self.resolve(kind, api_version).await?,
            None => self.search(kind).await?,
        };
        match resolved {
            Some((ar, caps)) => Ok(dynamic_api(&ar, &caps, self.client.clone(), namespace)),
            None => Err(ClusterError::Request(format!(
                "the cluster does not serve kind {kind}"
            ))),
        }
    }
}

fn dynamic_api(ar: &ApiResource, caps: &ApiCapabilities, client: Client, namespace: &str) -> Api<DynamicObject> {
    if caps.scope == Scope::Cluster {
        Api::all_with(client, ar)
    } else {
        Api::namespaced_with(client, namespace, ar)
    }
}

/// Split `apps/v1` into group and version; the core group has no prefix.
fn gvk_for(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

/// Map an API server status to the error taxonomy.
fn from_status(resp: ErrorResponse, reference: &ResourceRef) -> ClusterError {
    match resp.code {
        404 => ClusterError::NotFound(reference.clone()),
        400 | 422 => ClusterError::Invalid {
            resource: reference.clone(),
            reason: resp.message,
        },
        401 | 403 => ClusterError::Denied(format!("{} ({})", resp.message, resp.reason)),
        408 | 429 | 500 | 502 | 503 | 504 => {
            ClusterError::Connectivity(format!("{}: {}", resp.code, resp.message))
        }
        code => ClusterError::Request(format!("{code}: {} ({})", resp.message, resp.reason)),
    }
}

fn classify(err: kube::Error, reference: &ResourceRef) -> ClusterError {
    match err {
        kube::Error::Api(resp) => from_status(resp, reference),
        kube::Error::HyperError(e) => ClusterError::Connectivity(e.to_string()),
        kube::Error::Service(e) => ClusterError::Connectivity(e.to_string()),
        kube::Error::SerdeError(e) => ClusterError::Decode(e.to_string()),
        kube::Error::Auth(e) => ClusterError::Denied(e.to_string()),
        other => ClusterError::Request(other.to_string()),
    }
}

/// Reduce a typed pod to the fields readiness checks use.
fn pod_state(pod: &Pod) -> PodState {
    let status = pod.status.as_ref();
    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        });
    let restart_count = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|c| u32::try_from(c.restart_count).unwrap_or(0))
                .sum()
        })
        .unwrap_or(0);

    PodState {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        labels: pod.metadata.labels.clone().unwrap_or_else(BTreeMap::new),
        phase: status
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        ready,
        restart_count,
        terminating: pod.metadata.deletion_timestamp.is_some(),
    }
}

#[async_trait]
impl ClusterClient for KubeApiClient {
    async fn apply(&self, doc: &ResourceDocument) -> ClusterResult<AppliedResource> {
        let reference = doc.reference();
        let api_version = doc
            .api_version
            .as_deref()
            .ok_or_else(|| ClusterError::Invalid {
                resource: reference.clone(),
                reason: "apiVersion is missing".to_string(),
            })?;
        let (ar, caps) = self
            .resolve(&doc.kind, api_version)
            .await?
            .ok_or_else(|| ClusterError::Invalid {
                resource: reference.clone(),
                reason: format!("the cluster does not serve {} in {api_version}", doc.kind),
            })?;
        let api = dynamic_api(&ar, &caps, self.client.clone(), &doc.namespace);

        let previous = self
            .within(api.get_opt(&doc.name))
            .await?
            .map_err(|e| classify(e, &reference))?;

        let mut body = doc.to_json()?;
        if caps.scope == Scope::Cluster {
            if let Some(metadata) = body.get_mut("metadata").and_then(|m| m.as_object_mut()) {
                metadata.remove("namespace");
            }
        }

        debug!(resource = %reference, "server-side apply");
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let applied = match self.within(api.patch(&doc.name, &params, &Patch::Apply(&body))).await? {
            Ok(applied) => applied,
            // The target namespace does not exist.
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                return Err(ClusterError::Invalid {
                    resource: reference,
                    reason: resp.message,
                })
            }
            Err(e) => return Err(classify(e, &reference)),
        };

        let action = match previous {
            None => ApplyAction::Created,
            Some(before)
                if before.metadata.resource_version.is_some()
                    && before.metadata.resource_version == applied.metadata.resource_version =>
            {
                ApplyAction::Unchanged
            }
            Some(_) => ApplyAction::Configured,
        };
        Ok(AppliedResource { reference, action })
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<ResourceState> {
        let reference = ResourceRef::new(kind.clone(), namespace, name);
        let api = self.api_for(kind, namespace).await?;
        let object = self
            .within(api.get(name))
            .await?
            .map_err(|e| classify(e, &reference))?;

        let resource_version = object.metadata.resource_version.clone();
        Ok(ResourceState {
            reference,
            resource_version,
            body: serde_json::to_value(&object)?,
        })
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> ClusterResult<Vec<PodState>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&selector.to_string());
        let reference = ResourceRef::new(ResourceKind::Other("Pod".to_string()), namespace, "");
        let pods = self
            .within(api.list(&params))
            .await?
            .map_err(|e| classify(e, &reference))?;
        Ok(pods.items.iter().map(pod_state).collect())
    }

    async fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> ClusterResult<()> {
        let reference = ResourceRef::new(kind.clone(), namespace, name);
        let api = self.api_for(kind, namespace).await?;
        self.within(api.delete(name, &DeleteParams::background()))
            .await?
            .map_err(|e| classify(e, &reference))?;
        Ok(())
    }
}
