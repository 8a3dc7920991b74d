//! Scorer: folds per-item outcomes into a [`ScoreReport`].
//!
//! Scoring is pure. The same rubric, outcomes and threshold always produce
//! the same report, and the report serializes byte-identically (it carries no
//! timestamps or run ids; those live on the run result that wraps it).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::{GradeError, Result};
use crate::domain::outcome::{CheckOutcome, CheckStatus};
use crate::domain::rubric::Rubric;

/// One rubric item in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub id: String,
    pub label: String,
    pub points_earned: u32,
    pub points_possible: u32,
    pub status: CheckStatus,
    pub evidence: String,
    pub elapsed_ms: u64,
    pub attempts: u32,
}

impl ScoreRow {
    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

/// Final score of a grading run, rows in rubric declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub rows: Vec<ScoreRow>,
    pub earned: u32,
    pub possible: u32,
    pub threshold: u32,
    pub passed: bool,
}

impl ScoreReport {
    /// Earned points as a percentage of possible points.
    pub fn percent(&self) -> f64 {
        if self.possible == 0 {
            0.0
        } else {
            f64::from(self.earned) * 100.0 / f64::from(self.possible)
        }
    }

    pub fn passed_count(&self) -> usize {
        self.rows.iter().filter(|r| r.passed()).count()
    }

    pub fn row(&self, id: &str) -> Option<&ScoreRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Score `outcomes` against `rubric`.
///
/// Every rubric item needs exactly one outcome; outcomes for ids outside the
/// rubric are rejected too. The run passes when `earned >= threshold`.
pub fn score(rubric: &Rubric, outcomes: &[CheckOutcome], threshold: u32) -> Result<ScoreReport> {
    let mut by_id: HashMap<&str, &CheckOutcome> = HashMap::with_capacity(outcomes.len());
    for outcome in outcomes {
        if rubric.get(&outcome.item_id).is_none() {
            return Err(GradeError::OutcomeMismatch {
                item: outcome.item_id.clone(),
                detail: "not part of the rubric".to_string(),
            });
        }
        if by_id.insert(outcome.item_id.as_str(), outcome).is_some() {
            return Err(GradeError::OutcomeMismatch {
                item: outcome.item_id.clone(),
                detail: "more than one outcome recorded".to_string(),
            });
        }
    }

    let mut rows = Vec::with_capacity(rubric.items().len());
    for item in rubric.items() {
        let outcome = by_id.get(item.id()).ok_or_else(|| GradeError::OutcomeMismatch {
            item: item.id().to_string(),
            detail: "no outcome recorded".to_string(),
        })?;
        let points_earned = if outcome.passed() { item.weight() } else { 0 };
        rows.push(ScoreRow {
            id: item.id().to_string(),
            label: item.label().to_string(),
            points_earned,
            points_possible: item.weight(),
            status: outcome.status,
            evidence: outcome.evidence.clone(),
            elapsed_ms: outcome.elapsed_ms,
            attempts: outcome.attempts,
        });
    }

    let earned = rows.iter().map(|r| r.points_earned).sum();
    let possible = rows.iter().map(|r| r.points_possible).sum();
    Ok(ScoreReport {
        rows,
        earned,
        possible,
        threshold,
        passed: earned >= threshold,
    })
}
