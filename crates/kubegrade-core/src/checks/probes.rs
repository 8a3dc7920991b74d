//! Probes: liveness and readiness probes on every container.

use super::{settle, CheckContext};
use crate::domain::outcome::CheckVerdict;
use crate::domain::workload::{Container, Probe};

pub fn check(ctx: &CheckContext<'_>) -> CheckVerdict {
    settle(evaluate(ctx))
}

fn evaluate(ctx: &CheckContext<'_>) -> Result<CheckVerdict, CheckVerdict> {
    let (doc, deployment) = ctx.deployment()?;
    let containers = &deployment.spec.template.spec.containers;
    if containers.is_empty() {
        return Ok(CheckVerdict::Fail(format!(
            "Deployment `{}` declares no containers",
            doc.name
        )));
    }

    let required_path = ctx.config.probe_path.as_deref();
    let mut problems = Vec::new();
    for (i, container) in containers.iter().enumerate() {
        problems.extend(container_problems(container, i, required_path));
    }

    if problems.is_empty() {
        Ok(CheckVerdict::Pass(format!(
            "{} container(s) declare liveness and readiness probes",
            containers.len()
        )))
    } else {
        Ok(CheckVerdict::Fail(problems.join("; ")))
    }
}

fn container_problems(container: &Container, index: usize, required_path: Option<&str>) -> Vec<String> {
    let who = container.display_name(index);
    let mut problems = Vec::new();
    for (field, probe) in [
        ("livenessProbe", container.liveness_probe.as_ref()),
        ("readinessProbe", container.readiness_probe.as_ref()),
    ] {
        match probe {
            None => problems.push(format!("{who}: {field} is missing")),
            Some(probe) => probe_problems(&who, field, probe, required_path, &mut problems),
        }
    }
    problems
}

fn probe_problems(
    who: &str,
    field: &str,
    probe: &Probe,
    required_path: Option<&str>,
    problems: &mut Vec<String>,
) {
    if !probe.has_handler() {
        problems.push(format!(
            "{who}: {field} has no handler (httpGet, tcpSocket, exec or grpc)"
        ));
    }

    for (timing, value) in [
        ("initialDelaySeconds", probe.initial_delay_seconds),
        ("periodSeconds", probe.period_seconds),
    ] {
        match value {
            None => problems.push(format!("{who}: {field}.{timing} is missing")),
            Some(n) if n <= 0 => problems.push(format!("{who}: {field}.{timing} must be positive, got {n}")),
            Some(_) => {}
        }
    }

    if let Some(expected) = required_path {
        match probe.http_get.as_ref() {
            None => problems.push(format!("{who}: {field} must use httpGet on {expected}")),
            Some(http) => {
                let path = http.path.as_deref().unwrap_or("/");
                if path != expected {
                    problems.push(format!(
                        "{who}: {field}.httpGet.path is {path}, expected {expected}"
                    ));
                }
            }
        }
    }
}
