//! End-to-end scoring of submissions without a cluster: static checks run
//! directly and the live check is polled against a fixed pod snapshot.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kubegrade_cluster::fakes::{pending_pod, ready_pod};
use kubegrade_cluster::PodState;
use kubegrade_core::checks::live;
use kubegrade_core::{
    evaluate_static, poll_until, score, CheckContext, CheckOutcome, CheckStatus, GradingConfig,
    ManifestLoader, PollPolicy, Rubric, ScoreReport,
};
use tokio::sync::watch;

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/complete")
}

/// Copy the complete fixture, applying `edit` to every file's text.
fn edited_fixture(edit: impl Fn(&str) -> String) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for entry in fs::read_dir(fixture_dir()).unwrap() {
        let path = entry.unwrap().path();
        let text = fs::read_to_string(&path).unwrap();
        fs::write(dir.path().join(path.file_name().unwrap()), edit(&text)).unwrap();
    }
    dir
}

async fn grade(dir: &Path, config: &GradingConfig, pods: Vec<PodState>) -> ScoreReport {
    let submission = ManifestLoader::new(config.namespace.clone()).load_dir(dir).unwrap();
    let rubric = Rubric::standard(config).unwrap();
    let ctx = CheckContext::new(&submission, config);
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let mut outcomes = Vec::new();
    for item in rubric.items() {
        if !item.is_live() {
            let verdict = evaluate_static(item.check(), &ctx);
            outcomes.push(CheckOutcome::from_verdict(item.id(), verdict, Duration::ZERO));
            continue;
        }
        let outcome = match live::plan(&ctx) {
            Err(verdict) => CheckOutcome::from_verdict(item.id(), verdict, Duration::ZERO),
            Ok(plan) => {
                let pods = pods.clone();
                poll_until(item.id(), PollPolicy::for_item(item), cancel_rx.clone(), || {
                    let verdict = live::ready_pods(&plan, &pods);
                    async move { verdict }
                })
                .await
                .into_outcome(item.id())
            }
        };
        outcomes.push(outcome);
    }

    score(&rubric, &outcomes, config.pass_threshold).unwrap()
}

fn web_pods() -> Vec<PodState> {
    vec![
        ready_pod("web-7d4b9-a", &[("app", "web"), ("tier", "frontend")]),
        ready_pod("web-7d4b9-b", &[("app", "web"), ("tier", "frontend")]),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_complete_submission_scores_full_marks() {
    let config = GradingConfig {
        probe_path: Some("/health".to_string()),
        service_type: Some("NodePort".to_string()),
        ..GradingConfig::default()
    };
    let report = grade(&fixture_dir(), &config, web_pods()).await;
    assert_eq!(report.earned, 100, "{report:#?}");
    assert_eq!(report.possible, 100);
    assert!(report.passed);
}

#[tokio::test(start_paused = true)]
async fn test_missing_limits_costs_only_that_item() {
    let dir = edited_fixture(|text| {
        text.replace(
            "            limits:\n              cpu: 500m\n              memory: 128Mi\n",
            "",
        )
    });
    let config = GradingConfig::default();
    let report = grade(dir.path(), &config, web_pods()).await;

    let limits = report.row("resource_limits").unwrap();
    assert_eq!(report.earned, 100 - limits.points_possible);
    assert_eq!(limits.status, CheckStatus::Failed);
    assert!(limits.evidence.contains("resources.limits.cpu"));
    assert!(limits.evidence.contains("resources.limits.memory"));
    assert!(!report.passed);
}

#[tokio::test(start_paused = true)]
async fn test_selector_mismatch_cites_key() {
    let dir = edited_fixture(|text| {
        if text.contains("kind: Service") {
            text.replace("    app: web\n", "    app: foo\n")
        } else {
            text.replace("        app: web\n        tier: frontend\n", "        app: bar\n        tier: frontend\n")
        }
    });
    let report = grade(dir.path(), &GradingConfig::default(), web_pods()).await;
    let row = report.row("service_selector").unwrap();
    assert_eq!(row.status, CheckStatus::Failed);
    assert!(row.evidence.contains("`app`"), "{}", row.evidence);
}

#[tokio::test(start_paused = true)]
async fn test_pods_never_ready_times_out() {
    let config = GradingConfig {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_secs(1),
        ..GradingConfig::default()
    };
    let pods = vec![
        ready_pod("web-a", &[("app", "web")]),
        pending_pod("web-b", &[("app", "web")]),
    ];
    let report = grade(&fixture_dir(), &config, pods).await;
    let row = report.row("live_health").unwrap();
    assert_eq!(row.status, CheckStatus::TimedOut);
    assert_eq!(row.points_earned, 0);
    assert!(row.evidence.contains("web-b Pending"));
    assert_eq!(row.attempts, 6);
    assert_eq!(report.earned, 100 - row.points_possible);
}

#[tokio::test(start_paused = true)]
async fn test_same_outcomes_serialize_identically() {
    let config = GradingConfig::default();
    let first = grade(&fixture_dir(), &config, web_pods()).await;
    let second = grade(&fixture_dir(), &config, web_pods()).await;
    assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
}
