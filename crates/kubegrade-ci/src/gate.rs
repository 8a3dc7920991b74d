//! Pass/fail gate over a score report.

use kubegrade_core::{CheckStatus, ScoreReport};
use serde::{Deserialize, Serialize};

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateVerdict {
    /// Whether the submission reached the pass threshold.
    pub passed: bool,

    /// One line per item that did not earn its points (empty if all did).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Grading gate rules.
pub struct GradeGate;

impl GradeGate {
    /// Evaluate a report against its own threshold.
    ///
    /// Gate rule: `earned >= threshold`. Items that earned nothing are listed
    /// as violations whether or not the threshold was reached, so a passing
    /// run with lost points still says where they went.
    pub fn evaluate(report: &ScoreReport) -> GateVerdict {
        let violations: Vec<String> = report
            .rows
            .iter()
            .filter(|row| row.status != CheckStatus::Passed)
            .map(|row| {
                format!(
                    "{} ({}, -{} pts): {}",
                    row.id, row.status, row.points_possible, row.evidence
                )
            })
            .collect();

        let passed = report.earned >= report.threshold;
        let message = if passed {
            format!(
                "passed: {}/{} points (threshold {})",
                report.earned, report.possible, report.threshold
            )
        } else {
            format!(
                "failed: {}/{} points, {} needed; {} item(s) lost points",
                report.earned,
                report.possible,
                report.threshold,
                violations.len()
            )
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }
}
