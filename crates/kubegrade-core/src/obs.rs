//! Structured lifecycle events for grading runs.
//!
//! Every event carries an `event` field (`grade.started`, `apply.result`,
//! `item.transition`, ...) so JSON logs can be filtered without parsing
//! messages.

use tracing::{info, warn};

use crate::domain::outcome::CheckStatus;

/// Span tagging everything logged during one grading run.
///
/// Async callers attach it with `tracing::Instrument`; synchronous callers
/// can hold the guard returned by [`RunSpan::enter`].
#[derive(Debug, Clone)]
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(run_id: &str, submission_digest: &str) -> Self {
        let digest = submission_digest.get(..12).unwrap_or(submission_digest);
        Self {
            span: tracing::info_span!("kubegrade.run", run_id = %run_id, submission = %digest),
        }
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

pub fn emit_grade_started(run_id: &str, documents: usize, items: usize) {
    info!(event = "grade.started", run_id = %run_id, documents, items);
}

pub fn emit_grade_finished(run_id: &str, duration_ms: u64, earned: u32, possible: u32, passed: bool) {
    info!(
        event = "grade.finished",
        run_id = %run_id,
        duration_ms,
        earned,
        possible,
        passed,
    );
}

/// One apply attempt's final result for a document.
pub fn emit_apply_result(resource: &dyn std::fmt::Display, result: &str, attempts: u32) {
    info!(event = "apply.result", resource = %resource, result = %result, attempts);
}

pub fn emit_apply_retry(resource: &dyn std::fmt::Display, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "apply.retry", resource = %resource, attempt, error = %error);
}

/// A rubric item moved between poll states.
pub fn emit_item_transition(item_id: &str, from: &str, to: &str) {
    tracing::debug!(event = "item.transition", item = %item_id, from = %from, to = %to);
}

pub fn emit_item_outcome(item_id: &str, status: CheckStatus, elapsed_ms: u64, attempts: u32) {
    info!(
        event = "item.outcome",
        item = %item_id,
        status = %status,
        elapsed_ms,
        attempts,
    );
}

/// The run deadline fired while items were still polling.
pub fn emit_deadline_reached(run_id: &str, pending: usize) {
    warn!(event = "grade.deadline", run_id = %run_id, pending);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_shortens_digest() {
        let span = RunSpan::new("run-1", "abc");
        let _guard = span.enter();
        emit_item_transition("live_health", "pending", "polling");
    }
}
