//! In-memory fake cluster (testing only)
//!
//! `FakeCluster` satisfies the `ClusterClient` contract without a real API
//! server. Pod listings are scripted as a sequence of frames so tests can
//! replay an eventually-consistent rollout: each `list_pods` call consumes
//! one frame and the last frame repeats forever.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::cluster_traits::*;
use crate::error::ClusterError;
use crate::resource::{LabelSelector, ResourceDocument, ResourceKind, ResourceRef};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory cluster backed by a `BTreeMap<ResourceRef, object>`.
#[derive(Debug, Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<ResourceRef, serde_json::Value>>,
    pod_frames: Mutex<VecDeque<Vec<PodState>>>,
    rejected: Mutex<BTreeMap<String, String>>,
    apply_failures: Mutex<VecDeque<ClusterError>>,
    list_failure: Mutex<Option<ClusterError>>,
    apply_log: Mutex<Vec<ResourceRef>>,
    list_calls: AtomicUsize,
    apply_delay: Duration,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the pod listings returned by successive `list_pods` calls.
    pub fn with_pod_frames(self, frames: Vec<Vec<PodState>>) -> Self {
        *lock(&self.pod_frames) = frames.into();
        self
    }

    /// Reject any document named `name` as schema-invalid.
    pub fn reject(self, name: &str, reason: &str) -> Self {
        lock(&self.rejected).insert(name.to_string(), reason.to_string());
        self
    }

    /// Fail the next `count` apply calls with `err`.
    pub fn fail_next_applies(self, err: ClusterError, count: usize) -> Self {
        {
            let mut failures = lock(&self.apply_failures);
            for _ in 0..count {
                failures.push_back(err.clone());
            }
        }
        self
    }

    /// Make every apply call take `delay` before answering.
    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    /// Make every `list_pods` call fail with `err`.
    pub fn fail_list_pods(self, err: ClusterError) -> Self {
        *lock(&self.list_failure) = Some(err);
        self
    }

    /// Every apply attempt that reached the store, in call order.
    pub fn applied(&self) -> Vec<ResourceRef> {
        lock(&self.apply_log).clone()
    }

    /// Whether an object is currently stored.
    pub fn contains(&self, reference: &ResourceRef) -> bool {
        lock(&self.objects).contains_key(reference)
    }

    /// Number of `list_pods` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn next_frame(&self) -> Vec<PodState> {
        let mut frames = lock(&self.pod_frames);
        if frames.len() > 1 {
            frames.pop_front().unwrap_or_default()
        } else {
            frames.front().cloned().unwrap_or_default()
        }
    }
}

/// A pod that reports `Ready=True`.
pub fn ready_pod(name: &str, labels: &[(&str, &str)]) -> PodState {
    PodState {
        name: name.to_string(),
        namespace: "default".to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        phase: "Running".to_string(),
        ready: true,
        restart_count: 0,
        terminating: false,
    }
}

/// A pod that has not become ready yet.
pub fn pending_pod(name: &str, labels: &[(&str, &str)]) -> PodState {
    PodState {
        phase: "Pending".to_string(),
        ready: false,
        ..ready_pod(name, labels)
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn apply(&self, doc: &ResourceDocument) -> ClusterResult<AppliedResource> {
        let reference = doc.reference();
        if !self.apply_delay.is_zero() {
            tokio::time::sleep(self.apply_delay).await;
        }
        if let Some(err) = lock(&self.apply_failures).pop_front() {
            return Err(err);
        }
        if let Some(reason) = lock(&self.rejected).get(&doc.name) {
            return Err(ClusterError::Invalid {
                resource: reference,
                reason: reason.clone(),
            });
        }

        let body = doc.to_json()?;
        lock(&self.apply_log).push(reference.clone());
        let action = match lock(&self.objects).insert(reference.clone(), body.clone()) {
            None => ApplyAction::Created,
            Some(previous) if previous == body => ApplyAction::Unchanged,
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
        let objects = lock(&self.objects);
        let body = objects
            .get(&reference)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(reference.clone()))?;
        Ok(ResourceState {
            reference,
            resource_version: Some("1".to_string()),
            body,
        })
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> ClusterResult<Vec<PodState>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.list_failure).clone() {
            return Err(err);
        }
        Ok(self
            .next_frame()
            .into_iter()
            .filter(|pod| pod.namespace == namespace && selector.matches(&pod.labels))
            .collect())
    }

    async fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> ClusterResult<()> {
        let reference = ResourceRef::new(kind.clone(), namespace, name);
        lock(&self.objects)
            .remove(&reference)
            .map(|_| ())
            .ok_or(ClusterError::NotFound(reference))
    }
}
