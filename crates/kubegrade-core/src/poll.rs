//! Poll/wait engine for checks against eventually-consistent cluster state.
//!
//! A probe is re-run until it passes, errors, runs out of time or the whole
//! run is cancelled. Sleeping uses `tokio::time`, so many items can wait
//! concurrently and tests can drive the clock with `start_paused`.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};

use crate::domain::outcome::{CheckOutcome, CheckStatus, CheckVerdict};
use crate::domain::rubric::RubricItem;
use crate::obs;

/// Timing of one polled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn for_item(item: &RubricItem) -> Self {
        Self::new(item.poll_interval(), item.timeout())
    }
}

/// Lifecycle of a polled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Polling,
    Passed,
    TimedOut,
    Errored,
}

impl PollState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollState::Pending => "pending",
            PollState::Polling => "polling",
            PollState::Passed => "passed",
            PollState::TimedOut => "timed_out",
            PollState::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Passed | PollState::TimedOut | PollState::Errored)
    }

    fn status(&self) -> Option<CheckStatus> {
        match self {
            PollState::Passed => Some(CheckStatus::Passed),
            PollState::TimedOut => Some(CheckStatus::TimedOut),
            PollState::Errored => Some(CheckStatus::Errored),
            PollState::Pending | PollState::Polling => None,
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of [`poll_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub status: CheckStatus,
    pub evidence: String,
    pub elapsed: Duration,
    pub attempts: u32,
}

impl PollOutcome {
    pub fn into_outcome(self, item_id: impl Into<String>) -> CheckOutcome {
        CheckOutcome::new(item_id, self.status, self.evidence, self.elapsed, self.attempts)
    }
}

/// Resolves once `cancel` carries `true`; never resolves if the sender is
/// gone without having cancelled.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct Tracker<'a> {
    item_id: &'a str,
    state: PollState,
    started: Instant,
    attempts: u32,
}

impl Tracker<'_> {
    fn move_to(&mut self, next: PollState) {
        obs::emit_item_transition(self.item_id, self.state.as_str(), next.as_str());
        self.state = next;
    }

    fn finish(mut self, next: PollState, evidence: String) -> PollOutcome {
        self.move_to(next);
        PollOutcome {
            status: next.status().unwrap_or(CheckStatus::Errored),
            evidence,
            elapsed: self.started.elapsed(),
            attempts: self.attempts,
        }
    }
}

/// Run `probe` until it passes or the policy gives up.
///
/// * `Pass` resolves immediately as Passed.
/// * `Error` resolves immediately as Errored; errors are not retried.
/// * `Fail` is retried after `min(interval, remaining)` until `timeout` has
///   elapsed, then resolves as TimedOut with the last failure reason.
///
/// A probe call still running when the budget runs out is dropped. A
/// cancellation signal interrupts both probes and sleeps.
pub async fn poll_until<F, Fut>(
    item_id: &str,
    policy: PollPolicy,
    mut cancel: watch::Receiver<bool>,
    mut probe: F,
) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CheckVerdict>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut tracker = Tracker {
        item_id,
        state: PollState::Pending,
        started,
        attempts: 0,
    };
    let mut last_failure = "no attempt completed".to_string();

    tracker.move_to(PollState::Polling);
    loop {
        if *cancel.borrow() {
            return tracker.finish(PollState::TimedOut, deadline_note(&last_failure));
        }

        tracker.attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let attempt = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                return tracker.finish(PollState::TimedOut, deadline_note(&last_failure));
            }
            result = timeout(remaining, probe()) => result,
        };

        match attempt {
            Err(_) => {
                return tracker.finish(
                    PollState::TimedOut,
                    format!(
                        "{last_failure} (check still running after {}s)",
                        policy.timeout.as_secs_f64()
                    ),
                );
            }
            Ok(CheckVerdict::Pass(evidence)) => return tracker.finish(PollState::Passed, evidence),
            Ok(CheckVerdict::Error(reason)) => return tracker.finish(PollState::Errored, reason),
            Ok(CheckVerdict::Fail(reason)) => {
                tracing::debug!(item = %item_id, attempt = tracker.attempts, reason = %reason, "poll attempt failed");
                last_failure = reason;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return tracker.finish(PollState::TimedOut, last_failure);
        }
        let wait = policy.interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                return tracker.finish(PollState::TimedOut, deadline_note(&last_failure));
            }
            _ = sleep(wait) => {}
        }
    }
}

fn deadline_note(last_failure: &str) -> String {
    format!("{last_failure} (grading deadline reached)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(interval: u64, timeout: u64) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(interval), Duration::from_secs(timeout))
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_not_retried() {
        let (_tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome = poll_until("live_health", policy(1, 10), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { CheckVerdict::Error("cluster unreachable".to_string()) }
        })
        .await;
        assert_eq!(outcome.status, CheckStatus::Errored);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_pass() {
        let (_tx, rx) = watch::channel(false);
        let outcome = poll_until("live_health", policy(1, 10), rx, || async {
            CheckVerdict::Pass("2 ready".to_string())
        })
        .await;
        assert_eq!(outcome.status, CheckStatus::Passed);
        assert_eq!(outcome.evidence, "2 ready");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_is_cut_off() {
        let (_tx, rx) = watch::channel(false);
        let outcome = poll_until("live_health", policy(1, 3), rx, || async {
            sleep(Duration::from_secs(60)).await;
            CheckVerdict::Pass("too late".to_string())
        })
        .await;
        assert_eq!(outcome.status, CheckStatus::TimedOut);
        assert!(outcome.elapsed >= Duration::from_secs(3));
        assert!(outcome.elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_never_overshoots_timeout() {
        let (_tx, rx) = watch::channel(false);
        let outcome = poll_until("live_health", policy(4, 5), rx, || async {
            CheckVerdict::Fail("0 of 2 ready".to_string())
        })
        .await;
        // attempts at t=0, t=4, t=5
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.elapsed >= Duration::from_secs(5));
        assert!(outcome.elapsed < Duration::from_millis(5100));
        assert_eq!(outcome.evidence, "0 of 2 ready");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PollState::Polling.is_terminal());
        assert!(PollState::TimedOut.is_terminal());
        assert_eq!(PollState::Errored.status(), Some(CheckStatus::Errored));
    }
}
