//! Concurrent execution of live (polled) checks.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use kubegrade_core::obs;
use kubegrade_core::{poll_until, CheckOutcome, CheckStatus, CheckVerdict, PollPolicy};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::warn;

/// One attempt of a live check; called again on every poll.
pub type ProbeFn = Arc<dyn Fn() -> BoxFuture<'static, CheckVerdict> + Send + Sync>;

/// A live rubric item ready to be polled.
#[derive(Clone)]
pub struct LiveJob {
    pub item_id: String,
    pub policy: PollPolicy,
    pub probe: ProbeFn,
}

impl LiveJob {
    pub fn new(item_id: impl Into<String>, policy: PollPolicy, probe: ProbeFn) -> Self {
        Self {
            item_id: item_id.into(),
            policy,
            probe,
        }
    }
}

impl std::fmt::Debug for LiveJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveJob")
            .field("item_id", &self.item_id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Polls live jobs concurrently under an overall deadline.
#[derive(Debug, Clone)]
pub struct LiveRunner {
    max_concurrent: usize,
    deadline: Duration,
    run_id: String,
}

impl LiveRunner {
    pub fn new(max_concurrent: usize, deadline: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            deadline,
            run_id: String::new(),
        }
    }

    /// Tag deadline events with the owning run.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Run every job and return one outcome per job, in job order.
    ///
    /// Jobs finish in any order; results are written into the slot of the
    /// job that produced them. When the deadline fires, every poller still
    /// running is cancelled and reports TimedOut. A job whose task panics
    /// reports Errored without affecting the others.
    pub async fn run(&self, jobs: Vec<LiveJob>) -> Vec<CheckOutcome> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let sem = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set = JoinSet::new();

        for (idx, job) in jobs.iter().cloned().enumerate() {
            let sem = Arc::clone(&sem);
            let cancel = cancel_rx.clone();
            join_set.spawn(async move {
                let started = Instant::now();
                let work = async {
                    let _permit = sem.acquire_owned().await.ok();
                    let probe = Arc::clone(&job.probe);
                    poll_until(&job.item_id, job.policy, cancel, move || probe()).await
                };
                let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(polled) => polled.into_outcome(job.item_id.clone()),
                    Err(_) => {
                        warn!(item = %job.item_id, "live check task panicked");
                        CheckOutcome::new(
                            job.item_id.clone(),
                            CheckStatus::Errored,
                            "check panicked while polling",
                            started.elapsed(),
                            0,
                        )
                    }
                };
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<CheckOutcome>> = vec![None; jobs.len()];
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);
        let mut cancelled = false;

        loop {
            tokio::select! {
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok((idx, outcome))) => {
                        obs::emit_item_outcome(&outcome.item_id, outcome.status, outcome.elapsed_ms, outcome.attempts);
                        slots[idx] = Some(outcome);
                    }
                    Some(Err(e)) => warn!(error = %e, "live check task join error"),
                },
                _ = &mut deadline, if !cancelled => {
                    cancelled = true;
                    obs::emit_deadline_reached(&self.run_id, join_set.len());
                    let _ = cancel_tx.send(true);
                }
            }
        }

        jobs.iter()
            .zip(slots)
            .map(|(job, slot)| {
                slot.unwrap_or_else(|| {
                    CheckOutcome::new(
                        job.item_id.clone(),
                        CheckStatus::Errored,
                        "check task ended without an outcome",
                        Duration::ZERO,
                        0,
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(verdict: CheckVerdict) -> ProbeFn {
        Arc::new(move || {
            let verdict = verdict.clone();
            async move { verdict }.boxed()
        })
    }

    fn explode() -> CheckVerdict {
        panic!("probe blew up")
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_job_list() {
        let runner = LiveRunner::new(4, Duration::from_secs(1));
        assert!(runner.run(Vec::new()).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_probe_is_isolated() {
        let panicking: ProbeFn = Arc::new(|| async { explode() }.boxed());
        let jobs = vec![
            LiveJob::new("boom", PollPolicy::new(Duration::from_secs(1), Duration::from_secs(5)), panicking),
            LiveJob::new(
                "fine",
                PollPolicy::new(Duration::from_secs(1), Duration::from_secs(5)),
                constant(CheckVerdict::Pass("ready".to_string())),
            ),
        ];
        let outcomes = LiveRunner::new(2, Duration::from_secs(60)).run(jobs).await;
        assert_eq!(outcomes[0].item_id, "boom");
        assert_eq!(outcomes[0].status, CheckStatus::Errored);
        assert_eq!(outcomes[1].status, CheckStatus::Passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_runs_jobs_one_after_another() {
        let policy = PollPolicy::new(Duration::from_secs(1), Duration::from_secs(3));
        let jobs = vec![
            LiveJob::new("a", policy, constant(CheckVerdict::Fail("not yet".to_string()))),
            LiveJob::new("b", policy, constant(CheckVerdict::Fail("not yet".to_string()))),
        ];
        let started = Instant::now();
        let outcomes = LiveRunner::new(1, Duration::from_secs(60)).run(jobs).await;
        assert!(outcomes.iter().all(|o| o.status == CheckStatus::TimedOut));
        assert!(started.elapsed() >= Duration::from_secs(6));
    }
}
