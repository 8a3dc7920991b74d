//! kubegrade - grade container-orchestration exercises
//!
//! The `kubegrade` command loads a directory of learner manifests, applies
//! them to a cluster and scores every rubric item independently.
//!
//! ## Commands
//!
//! - `check`: score the manifest-only rubric items, no cluster needed
//! - `grade`: apply the manifests and score the full rubric
//! - `clean`: delete everything a submission applied

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use kubegrade_ci::{delete_all, ApplyRecord, GateVerdict, GradeGate, GradingPipeline, GradingResult};
use kubegrade_cluster::{ClusterClient, KubeApiClient};
use kubegrade_core::{CheckStatus, GradingConfig, ManifestLoader, Rubric, ScoreReport, Submission};

#[derive(Parser)]
#[command(name = "kubegrade")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Grade Kubernetes manifests against a rubric", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// YAML file with grading options
    #[arg(short, long, global = true, env = "KUBEGRADE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score the manifest-only rubric items without a cluster
    Check {
        /// Directory containing the submission's manifests
        dir: PathBuf,

        #[command(flatten)]
        options: GradeOptions,

        #[command(flatten)]
        report: ReportOptions,
    },

    /// Apply the manifests to a cluster and score the full rubric
    Grade {
        /// Directory containing the submission's manifests
        dir: PathBuf,

        #[command(flatten)]
        options: GradeOptions,

        #[command(flatten)]
        report: ReportOptions,

        /// kubeconfig context to grade against
        #[arg(long, env = "KUBEGRADE_CONTEXT")]
        context: Option<String>,
    },

    /// Delete every object a submission applied
    Clean {
        /// Directory containing the submission's manifests
        dir: PathBuf,

        /// Namespace for documents that do not name one
        #[arg(short, long, env = "KUBEGRADE_NAMESPACE")]
        namespace: Option<String>,

        /// kubeconfig context to clean up in
        #[arg(long, env = "KUBEGRADE_CONTEXT")]
        context: Option<String>,
    },
}

/// Overrides layered on top of the config file.
#[derive(Args, Debug, Default, Clone)]
struct GradeOptions {
    /// Namespace for documents that do not name one
    #[arg(short, long, env = "KUBEGRADE_NAMESPACE")]
    namespace: Option<String>,

    /// Minimum replicas the Deployment must declare
    #[arg(long, env = "KUBEGRADE_MIN_REPLICAS")]
    min_replicas: Option<u32>,

    /// Pods that must report ready for the live check
    #[arg(long, env = "KUBEGRADE_MIN_READY_PODS")]
    min_ready_pods: Option<u32>,

    /// Seconds between live check attempts
    #[arg(long, env = "KUBEGRADE_POLL_INTERVAL", value_parser = parse_seconds)]
    poll_interval: Option<Duration>,

    /// Seconds a live check may keep failing before it times out
    #[arg(long, env = "KUBEGRADE_TIMEOUT", value_parser = parse_seconds)]
    timeout: Option<Duration>,

    /// Seconds the whole run may take
    #[arg(long, env = "KUBEGRADE_DEADLINE", value_parser = parse_seconds)]
    deadline: Option<Duration>,

    /// Points needed to pass
    #[arg(long, env = "KUBEGRADE_PASS_THRESHOLD")]
    pass_threshold: Option<u32>,
}

#[derive(Args, Debug, Clone)]
struct ReportOptions {
    /// Report format written to stdout
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, env = "KUBEGRADE_OUTPUT")]
    output: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(long, env = "KUBEGRADE_REPORT")]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("`{value}` must be a positive number of seconds"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("`{value}` seconds: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    kubegrade_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Check {
            dir,
            options,
            report,
        } => {
            let config = load_config(cli.config.as_deref(), &options)?;
            cmd_check(&dir, &config, &report)
        }
        Commands::Grade {
            dir,
            options,
            report,
            context,
        } => {
            let config = load_config(cli.config.as_deref(), &options)?;
            let client = KubeApiClient::connect(context.as_deref())
                .await
                .context("Failed to connect to the cluster")?;
            cmd_grade(Arc::new(client), &dir, &config, &report).await
        }
        Commands::Clean {
            dir,
            namespace,
            context,
        } => {
            let options = GradeOptions {
                namespace,
                ..GradeOptions::default()
            };
            let config = load_config(cli.config.as_deref(), &options)?;
            let client = KubeApiClient::connect(context.as_deref())
                .await
                .context("Failed to connect to the cluster")?;
            cmd_clean(&client, &dir, &config).await
        }
    }
}

/// Config file (or defaults), then flag and environment overrides.
fn load_config(path: Option<&Path>, options: &GradeOptions) -> Result<GradingConfig> {
    let mut config = match path {
        Some(path) => GradingConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => GradingConfig::default(),
    };

    if let Some(namespace) = &options.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(v) = options.min_replicas {
        config.min_replicas = v;
    }
    if let Some(v) = options.min_ready_pods {
        config.min_ready_pods = v;
    }
    if let Some(v) = options.poll_interval {
        config.poll_interval = v;
    }
    if let Some(v) = options.timeout {
        config.timeout = v;
    }
    if let Some(v) = options.deadline {
        config.deadline = v;
    }
    if let Some(v) = options.pass_threshold {
        config.pass_threshold = v;
    }

    config.validate().context("Invalid grading options")?;
    Ok(config)
}

fn load_submission(dir: &Path, config: &GradingConfig) -> Result<Submission> {
    let submission = ManifestLoader::new(config.namespace.clone())
        .load_dir(dir)
        .with_context(|| format!("Failed to load manifests from {}", dir.display()))?;
    info!(
        documents = submission.len(),
        digest = %submission.digest(),
        "submission loaded"
    );
    Ok(submission)
}

fn cmd_check(dir: &Path, config: &GradingConfig, report: &ReportOptions) -> Result<()> {
    let submission = load_submission(dir, config)?;
    let rubric = Rubric::standard(config).context("Failed to build rubric")?;
    let result = GradingPipeline::check(&submission, &rubric, config)
        .context("Manifest checks failed to run")?;
    finish(&result, report)
}

async fn cmd_grade(
    cluster: Arc<dyn ClusterClient>,
    dir: &Path,
    config: &GradingConfig,
    report: &ReportOptions,
) -> Result<()> {
    let submission = load_submission(dir, config)?;
    let rubric = Rubric::standard(config).context("Failed to build rubric")?;
    let result = GradingPipeline::run(cluster, &submission, &rubric, config)
        .await
        .context("Grading run failed")?;
    finish(&result, report)
}

async fn cmd_clean(cluster: &dyn ClusterClient, dir: &Path, config: &GradingConfig) -> Result<()> {
    let submission = load_submission(dir, config)?;
    let failures = delete_all(cluster, &submission).await;

    for doc in submission.documents().iter().rev() {
        let reference = doc.reference();
        match failures.iter().find(|(r, _)| *r == reference) {
            Some((_, e)) => println!("  ✗ {reference}: {e}"),
            None => println!("  ✓ {reference}"),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} object(s) could not be deleted", failures.len())
    }
}

/// Print the report, write the optional report file and apply the gate.
fn finish(result: &GradingResult, report: &ReportOptions) -> Result<()> {
    let verdict = GradeGate::evaluate(&result.report);

    if let Some(path) = &report.report {
        std::fs::write(path, result.to_json_pretty()?)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }

    match report.output {
        OutputFormat::Json => println!("{}", result.to_json_pretty()?),
        OutputFormat::Text => print!("{}", render_text(result, &verdict)),
    }

    if verdict.passed {
        Ok(())
    } else {
        anyhow::bail!("Submission did not pass: {}", verdict.message)
    }
}

fn render_text(result: &GradingResult, verdict: &GateVerdict) -> String {
    let mut out = String::new();
    out.push_str(&format!("Run ID: {}\n", result.run_id));
    out.push_str(&format!("Submission: {}\n", result.spec.submission_dir.display()));
    out.push_str(&format!("Digest: {}\n", result.spec.submission_digest));
    out.push_str(&format!("Duration: {}ms\n", result.duration_ms));

    if !result.applied.is_empty() {
        out.push_str("\nApplied:\n");
        for record in &result.applied {
            out.push_str(&render_apply(record));
        }
    }

    out.push_str("\nRubric:\n");
    for row in &result.report.rows {
        let mark = if row.passed() { "✓" } else { "✗" };
        let status = match row.status {
            CheckStatus::Passed | CheckStatus::Failed => String::new(),
            other => format!(", {other}"),
        };
        out.push_str(&format!(
            "  {mark} {} ({}/{}{status})\n",
            row.label, row.points_earned, row.points_possible
        ));
        out.push_str(&format!("      {}\n", row.evidence));
    }

    out.push('\n');
    out.push_str(&format!("Score: {}\n", progress_bar(&result.report)));
    out.push_str(&format!(
        "Summary: {}/{} items passed\n",
        result.passed_count(),
        result.report.rows.len()
    ));
    out.push_str(&format!(
        "Gate: {} ({})\n",
        if verdict.passed { "✓ PASSED" } else { "✗ FAILED" },
        verdict.message
    ));
    out
}

fn render_apply(record: &ApplyRecord) -> String {
    match record.problem() {
        None => format!("  ✓ {} {}\n", record.resource, record.result.as_str()),
        Some(problem) => format!("  ✗ {problem} (after {} attempt(s))\n", record.attempts),
    }
}

const BAR_WIDTH: u32 = 20;

fn progress_bar(report: &ScoreReport) -> String {
    let filled = if report.possible == 0 {
        0
    } else {
        report.earned.min(report.possible) * BAR_WIDTH / report.possible
    };
    format!(
        "[{}{}] {}/{} ({:.0}%)",
        "#".repeat(filled as usize),
        "-".repeat((BAR_WIDTH - filled) as usize),
        report.earned,
        report.possible,
        report.percent()
    )
}
