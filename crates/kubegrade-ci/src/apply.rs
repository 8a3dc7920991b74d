//! Applying and removing a submission.

use std::time::Duration;

use kubegrade_cluster::{ApplyAction, ClusterClient, ClusterError, ResourceRef};
use kubegrade_core::obs;
use kubegrade_core::Submission;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::warn;

const DEADLINE_REACHED: &str = "grading deadline reached before the document was applied";

/// How applying one document ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApplyResult {
    /// Accepted by the API server.
    Applied { action: ApplyAction },
    /// The API server refused the document; retrying cannot help.
    Rejected { reason: String },
    /// The cluster could not be reached or the call failed.
    Failed { reason: String },
}

impl ApplyResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyResult::Applied { action } => action.as_str(),
            ApplyResult::Rejected { .. } => "rejected",
            ApplyResult::Failed { .. } => "failed",
        }
    }
}

/// Apply result of one document, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRecord {
    pub resource: ResourceRef,
    #[serde(flatten)]
    pub result: ApplyResult,
    pub attempts: u32,
}

impl ApplyRecord {
    pub fn accepted(&self) -> bool {
        matches!(self.result, ApplyResult::Applied { .. })
    }

    /// Why the document is not in the cluster, if it is not.
    pub fn problem(&self) -> Option<String> {
        match &self.result {
            ApplyResult::Applied { .. } => None,
            ApplyResult::Rejected { reason } => Some(format!("{} was rejected: {reason}", self.resource)),
            ApplyResult::Failed { reason } => Some(format!("{} could not be applied: {reason}", self.resource)),
        }
    }
}

/// Apply every document once, in order, until `deadline`.
///
/// Connectivity failures are retried up to `attempts` times with `backoff`
/// between tries; other failures are recorded straight away. A failed
/// document does not stop the rest from being applied. Documents still
/// pending when the deadline passes are recorded as failed.
pub async fn apply_all(
    cluster: &dyn ClusterClient,
    submission: &Submission,
    attempts: u32,
    backoff: Duration,
    deadline: Instant,
) -> Vec<ApplyRecord> {
    let attempts = attempts.max(1);
    let mut records = Vec::with_capacity(submission.len());

    for doc in submission.documents() {
        let resource = doc.reference();
        if Instant::now() >= deadline {
            obs::emit_apply_result(&resource, "failed", 0);
            records.push(ApplyRecord {
                resource,
                result: ApplyResult::Failed {
                    reason: DEADLINE_REACHED.to_string(),
                },
                attempts: 0,
            });
            continue;
        }

        let mut tried = 0;
        let bounded = tokio::time::timeout_at(deadline, async {
            loop {
                tried += 1;
                match cluster.apply(doc).await {
                    Ok(applied) => break ApplyResult::Applied { action: applied.action },
                    Err(ClusterError::Invalid { reason, .. }) => break ApplyResult::Rejected { reason },
                    Err(e) if e.is_retryable() && tried < attempts => {
                        obs::emit_apply_retry(&resource, tried, &e);
                        tokio::time::sleep(backoff).await;
                    }
                    Err(e) => break ApplyResult::Failed { reason: e.to_string() },
                }
            }
        })
        .await;
        let result = bounded.unwrap_or_else(|_| ApplyResult::Failed {
            reason: DEADLINE_REACHED.to_string(),
        });

        obs::emit_apply_result(&resource, result.as_str(), tried);
        records.push(ApplyRecord {
            resource,
            result,
            attempts: tried,
        });
    }

    records
}

/// Delete every document of the submission, newest first.
///
/// Objects that are already gone count as deleted. Returns the resources
/// that could not be removed together with the error.
pub async fn delete_all(
    cluster: &dyn ClusterClient,
    submission: &Submission,
) -> Vec<(ResourceRef, ClusterError)> {
    let mut failures = Vec::new();
    for doc in submission.documents().iter().rev() {
        match cluster.delete(&doc.kind, &doc.namespace, &doc.name).await {
            Ok(()) | Err(ClusterError::NotFound(_)) => {}
            Err(e) => {
                warn!(resource = %doc.reference(), error = %e, "delete failed");
                failures.push((doc.reference(), e));
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_text() {
        let record = ApplyRecord {
            resource: ResourceRef::new("Deployment".into(), "default", "web"),
            result: ApplyResult::Rejected {
                reason: "spec.replicas: Invalid value".to_string(),
            },
            attempts: 1,
        };
        assert!(!record.accepted());
        assert_eq!(
            record.problem().unwrap(),
            "Deployment/web (namespace default) was rejected: spec.replicas: Invalid value"
        );
    }

    fn submission() -> Submission {
        let docs = kubegrade_core::ManifestLoader::default()
            .parse_documents(
                std::path::Path::new("app.yaml"),
                "apiVersion: v1\nkind: ConfigMap\nmetadata: {name: cfg}\n---\napiVersion: apps/v1\nkind: Deployment\nmetadata: {name: web}\n",
            )
            .unwrap();
        Submission::from_documents(docs, std::path::PathBuf::from(".")).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_apply_stops_at_deadline() {
        use kubegrade_cluster::fakes::FakeCluster;

        let cluster = FakeCluster::new().with_apply_delay(Duration::from_secs(4));
        let start = Instant::now();
        let records = apply_all(&cluster, &submission(), 3, Duration::from_secs(1), start + Duration::from_secs(6)).await;

        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert!(records[0].accepted());
        assert_eq!(records[1].attempts, 1);
        assert_eq!(
            records[1].result,
            ApplyResult::Failed {
                reason: DEADLINE_REACHED.to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_documents_after_deadline_are_not_attempted() {
        use kubegrade_cluster::fakes::FakeCluster;

        let cluster = FakeCluster::new().with_apply_delay(Duration::from_secs(10));
        let start = Instant::now();
        let records = apply_all(&cluster, &submission(), 1, Duration::ZERO, start + Duration::from_secs(3)).await;

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.accepted()));
        assert_eq!(records[1].attempts, 0);
        assert!(cluster.applied().is_empty());
    }

    #[test]
    fn test_record_json_is_flat() {
        let record = ApplyRecord {
            resource: ResourceRef::new("Service".into(), "default", "web"),
            result: ApplyResult::Applied {
                action: ApplyAction::Unchanged,
            },
            attempts: 1,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["result"], "applied");
        assert_eq!(json["attempts"], 1);
    }
}
