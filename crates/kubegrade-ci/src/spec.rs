//! Grading run identity.

use std::path::PathBuf;

use kubegrade_core::{GradingConfig, Rubric, Submission};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a grading run was asked to do.
///
/// Two runs with equal specs graded the same files against the same rubric
/// with the same settings, so their reports are comparable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeSpec {
    /// Directory the submission was loaded from.
    pub submission_dir: PathBuf,

    /// SHA-256 of the submission files.
    pub submission_digest: String,

    /// SHA-256 of ordered rubric item ids and weights.
    pub rubric_digest: String,

    /// SHA-256 of the effective configuration.
    pub config_digest: String,
}

impl GradeSpec {
    pub fn new(
        submission: &Submission,
        rubric: &Rubric,
        config: &GradingConfig,
    ) -> anyhow::Result<Self> {
        let items: Vec<String> = rubric
            .items()
            .iter()
            .map(|i| format!("{}={}", i.id(), i.weight()))
            .collect();
        let config_json = serde_json::to_vec(config)?;

        Ok(Self {
            submission_dir: submission.source_dir().to_path_buf(),
            submission_digest: submission.digest().to_string(),
            rubric_digest: compute_items_digest(&items),
            config_digest: compute_component_digest(&config_json),
        })
    }

    /// Digest over all three components.
    pub fn spec_digest(&self) -> String {
        compute_items_digest(&[
            self.submission_digest.clone(),
            self.rubric_digest.clone(),
            self.config_digest.clone(),
        ])
    }
}

/// Deterministic digest of an ordered list.
fn compute_items_digest(items: &[String]) -> String {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update(item.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

fn compute_component_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
