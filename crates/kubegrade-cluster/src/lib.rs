//! kubegrade-cluster: the cluster boundary of the grader
//!
//! This crate owns every interaction with the orchestration API. The rest of
//! the workspace only sees the [`ClusterClient`] trait.
//!
//! ## Layer 0 - Cluster I/O
//!
//! Focus: a small, capability-bounded surface (apply/get/list pods/delete)
//! that can be swapped for an in-memory fake in tests.
//!
//! ## Key Components
//!
//! - `ResourceDocument`: one learner manifest, kind-tagged with a raw body
//! - `ClusterClient`: async trait implemented by `KubeApiClient` and `FakeCluster`
//! - `ClusterError`: error taxonomy separating retryable connectivity loss
//!   from rejected documents

pub mod cluster_traits;
mod error;
pub mod fakes;
pub mod kube_api;
pub mod resource;

pub use cluster_traits::{
    AppliedResource, ApplyAction, ClusterClient, ClusterResult, PodState, ResourceState,
};
pub use error::ClusterError;
pub use kube_api::KubeApiClient;
pub use resource::{DocumentSource, LabelSelector, ResourceDocument, ResourceKind, ResourceRef};
