//! Error types for kubegrade-cluster

use thiserror::Error;

use crate::resource::ResourceRef;

/// Errors surfaced by a [`crate::ClusterClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// The addressed object does not exist in the cluster
    #[error("resource not found: {0}")]
    NotFound(ResourceRef),

    /// The API server rejected the document (schema or validation error)
    #[error("{resource} rejected by the cluster: {reason}")]
    Invalid { resource: ResourceRef, reason: String },

    /// The API server could not be reached
    #[error("cluster unreachable: {0}")]
    Connectivity(String),

    /// The credentials were refused or lack permission for the request
    #[error("cluster access denied: {0}")]
    Denied(String),

    /// No usable cluster configuration (kubeconfig or in-cluster env)
    #[error("cluster configuration error: {0}")]
    Config(String),

    /// The API server answered with an error outside the cases above
    #[error("cluster request failed: {0}")]
    Request(String),

    /// The cluster answered with something we could not interpret
    #[error("malformed cluster response: {0}")]
    Decode(String),
}

impl ClusterError {
    /// Whether the caller may retry the same request.
    ///
    /// Only connectivity failures qualify; a rejected document stays
    /// rejected no matter how often it is resent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClusterError::Connectivity(_))
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Decode(err.to_string())
    }
}
