//! Grading pipeline orchestration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use kubegrade_cluster::ClusterClient;
use kubegrade_core::checks::live::{self, LivePlan};
use kubegrade_core::obs::{self, RunSpan};
use kubegrade_core::{
    evaluate_static, score, CheckContext, CheckKind, CheckOutcome, CheckVerdict, GradingConfig,
    PollPolicy, Rubric, ScoreReport, Submission,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::apply::{apply_all, ApplyRecord};
use crate::runner::{LiveJob, LiveRunner, ProbeFn};
use crate::spec::GradeSpec;

/// Result of a complete grading run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingResult {
    pub run_id: String,

    pub spec: GradeSpec,

    pub started_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Apply result per document, in submission order (empty for static runs).
    pub applied: Vec<ApplyRecord>,

    pub report: ScoreReport,
}

impl GradingResult {
    /// Number of rubric items that earned their points.
    pub fn passed_count(&self) -> usize {
        self.report.passed_count()
    }

    /// Number of rubric items that did not.
    pub fn failed_count(&self) -> usize {
        self.report.rows.len() - self.report.passed_count()
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Grading pipeline orchestrator.
pub struct GradingPipeline;

impl GradingPipeline {
    /// Grade a submission against a live cluster.
    ///
    /// Documents are applied once, in order, before any check runs; applying
    /// shares `config.deadline` with the live checks. Static
    /// items are then evaluated synchronously and live items are polled
    /// concurrently until they settle or `config.deadline` expires. Every
    /// rubric item ends with exactly one outcome; a failing item never
    /// aborts the run.
    pub async fn run(
        cluster: Arc<dyn ClusterClient>,
        submission: &Submission,
        rubric: &Rubric,
        config: &GradingConfig,
    ) -> anyhow::Result<GradingResult> {
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::new(&run_id, submission.digest());
        Self::run_inner(run_id, cluster, submission, rubric, config)
            .instrument(span.span())
            .await
    }

    async fn run_inner(
        run_id: String,
        cluster: Arc<dyn ClusterClient>,
        submission: &Submission,
        rubric: &Rubric,
        config: &GradingConfig,
    ) -> anyhow::Result<GradingResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let spec = GradeSpec::new(submission, rubric, config)?;
        obs::emit_grade_started(&run_id, submission.len(), rubric.items().len());

        let deadline = start + config.deadline;
        let applied = apply_all(
            cluster.as_ref(),
            submission,
            config.apply_attempts,
            config.apply_backoff,
            deadline,
        )
        .await;

        let ctx = CheckContext::new(submission, config);
        let mut slots: Vec<Option<CheckOutcome>> = vec![None; rubric.items().len()];
        let mut jobs = Vec::new();
        let mut job_slots = Vec::new();

        for (idx, item) in rubric.items().iter().enumerate() {
            if !item.is_live() {
                slots[idx] = Some(run_static(item.id(), item.check(), &ctx));
                continue;
            }

            let plan = match live::plan(&ctx) {
                Ok(plan) => plan,
                Err(verdict) => {
                    slots[idx] = Some(resolved(item.id(), verdict));
                    continue;
                }
            };

            let problem = match applied.iter().find(|r| r.resource == plan.deployment) {
                Some(record) => record.problem(),
                None => Some(format!("{} was not applied", plan.deployment)),
            };
            if let Some(problem) = problem {
                slots[idx] = Some(resolved(item.id(), CheckVerdict::Error(problem)));
                continue;
            }

            job_slots.push(idx);
            jobs.push(LiveJob::new(
                item.id(),
                PollPolicy::for_item(item),
                pod_probe(Arc::clone(&cluster), plan),
            ));
        }

        if !jobs.is_empty() {
            let remaining = config.deadline.saturating_sub(start.elapsed());
            let max_concurrent = config.max_concurrent_polls.unwrap_or(jobs.len());
            info!(jobs = jobs.len(), max_concurrent, "polling live checks");
            let outcomes = LiveRunner::new(max_concurrent, remaining)
                .with_run_id(run_id.clone())
                .run(jobs)
                .await;
            for (idx, outcome) in job_slots.into_iter().zip(outcomes) {
                slots[idx] = Some(outcome);
            }
        }

        let outcomes: Vec<CheckOutcome> = slots.into_iter().flatten().collect();
        let report = score(rubric, &outcomes, config.pass_threshold)
            .context("scoring grading outcomes")?;

        let duration_ms = millis(start.elapsed());
        obs::emit_grade_finished(&run_id, duration_ms, report.earned, report.possible, report.passed);

        Ok(GradingResult {
            run_id,
            spec,
            started_at,
            duration_ms,
            applied,
            report,
        })
    }

    /// Grade only the manifest checks, without touching a cluster.
    ///
    /// Live items are dropped from the rubric; the pass threshold is capped
    /// at the points still available.
    pub fn check(
        submission: &Submission,
        rubric: &Rubric,
        config: &GradingConfig,
    ) -> anyhow::Result<GradingResult> {
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::new(&run_id, submission.digest());
        let _guard = span.enter();

        let started_at = Utc::now();
        let start = std::time::Instant::now();
        let rubric = rubric.static_only()?;
        let spec = GradeSpec::new(submission, &rubric, config)?;
        obs::emit_grade_started(&run_id, submission.len(), rubric.items().len());

        let ctx = CheckContext::new(submission, config);
        let outcomes: Vec<CheckOutcome> = rubric
            .items()
            .iter()
            .map(|item| run_static(item.id(), item.check(), &ctx))
            .collect();

        let threshold = config.pass_threshold.min(rubric.total_weight());
        let report = score(&rubric, &outcomes, threshold).context("scoring manifest checks")?;

        let duration_ms = millis(start.elapsed());
        obs::emit_grade_finished(&run_id, duration_ms, report.earned, report.possible, report.passed);

        Ok(GradingResult {
            run_id,
            spec,
            started_at,
            duration_ms,
            applied: Vec::new(),
            report,
        })
    }
}

fn run_static(item_id: &str, kind: CheckKind, ctx: &CheckContext<'_>) -> CheckOutcome {
    let start = std::time::Instant::now();
    let verdict = evaluate_static(kind, ctx);
    let outcome = CheckOutcome::from_verdict(item_id, verdict, start.elapsed());
    obs::emit_item_outcome(item_id, outcome.status, outcome.elapsed_ms, outcome.attempts);
    outcome
}

/// Outcome of a live item that never reached the poller.
fn resolved(item_id: &str, verdict: CheckVerdict) -> CheckOutcome {
    let mut outcome = CheckOutcome::from_verdict(item_id, verdict, Duration::ZERO);
    outcome.attempts = 0;
    obs::emit_item_outcome(item_id, outcome.status, 0, 0);
    outcome
}

/// Probe that lists the Deployment's pods and judges readiness.
fn pod_probe(cluster: Arc<dyn ClusterClient>, plan: LivePlan) -> ProbeFn {
    let plan = Arc::new(plan);
    Arc::new(move || {
        let cluster = Arc::clone(&cluster);
        let plan = Arc::clone(&plan);
        async move {
            match cluster.list_pods(&plan.namespace, &plan.selector).await {
                Ok(pods) => live::ready_pods(&plan, &pods),
                Err(e) => CheckVerdict::Error(format!(
                    "cannot list pods of {}: {e}",
                    plan.deployment
                )),
            }
        }
        .boxed()
    })
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubegrade_core::{CheckStatus, ManifestLoader};
    use std::path::{Path, PathBuf};

    const STATIC_ONLY: &str = "kind: Deployment\nmetadata: {name: web}\nspec:\n  replicas: 3\n";

    #[test]
    fn test_check_mode_caps_threshold_and_skips_live_items() {
        let docs = ManifestLoader::default()
            .parse_documents(Path::new("web.yaml"), STATIC_ONLY)
            .unwrap();
        let submission = Submission::from_documents(docs, PathBuf::from(".")).unwrap();
        let config = GradingConfig::default();
        let rubric = Rubric::standard(&config).unwrap();

        let result = GradingPipeline::check(&submission, &rubric, &config).unwrap();
        assert!(result.report.row("live_health").is_none());
        assert_eq!(result.report.possible, 85);
        assert_eq!(result.report.threshold, 85);
        assert_eq!(result.report.row("replica_count").unwrap().status, CheckStatus::Passed);
        assert!(result.applied.is_empty());
        assert_eq!(result.passed_count() + result.failed_count(), result.report.rows.len());
    }
}
