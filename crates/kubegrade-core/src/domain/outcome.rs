//! Check verdicts and per-item outcomes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result of evaluating a single check once, without timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckVerdict {
    /// The dimension is satisfied; the text says what was observed.
    Pass(String),
    /// The submission does not satisfy the dimension.
    Fail(String),
    /// The check itself could not be evaluated.
    Error(String),
}

impl CheckVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, CheckVerdict::Pass(_))
    }

    pub fn evidence(&self) -> &str {
        match self {
            CheckVerdict::Pass(s) | CheckVerdict::Fail(s) | CheckVerdict::Error(s) => s,
        }
    }
}

/// Final status of a rubric item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    TimedOut,
    Errored,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::TimedOut => "timed_out",
            CheckStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one rubric item in one grading run.
///
/// Produced exactly once per item and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub item_id: String,
    pub status: CheckStatus,
    pub evidence: String,
    pub elapsed_ms: u64,
    /// Number of times the check was evaluated (1 for static checks).
    pub attempts: u32,
}

impl CheckOutcome {
    pub fn new(
        item_id: impl Into<String>,
        status: CheckStatus,
        evidence: impl Into<String>,
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            status,
            evidence: evidence.into(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            attempts,
        }
    }

    /// Outcome of a check evaluated a single time.
    pub fn from_verdict(item_id: impl Into<String>, verdict: CheckVerdict, elapsed: Duration) -> Self {
        let (status, evidence) = match verdict {
            CheckVerdict::Pass(s) => (CheckStatus::Passed, s),
            CheckVerdict::Fail(s) => (CheckStatus::Failed, s),
            CheckVerdict::Error(s) => (CheckStatus::Errored, s),
        };
        Self::new(item_id, status, evidence, elapsed, 1)
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}
