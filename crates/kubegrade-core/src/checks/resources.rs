//! ResourceLimits: every container bounds its cpu and memory.

use std::collections::BTreeMap;

use super::{settle, CheckContext};
use crate::domain::outcome::CheckVerdict;
use crate::domain::workload::{Container, RawQuantity};
use crate::quantity::Quantity;

const RESOURCES: [&str; 2] = ["cpu", "memory"];

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

    let problems: Vec<String> = containers
        .iter()
        .enumerate()
        .flat_map(|(i, c)| container_problems(c, i))
        .collect();

    if problems.is_empty() {
        Ok(CheckVerdict::Pass(format!(
            "{} container(s) declare cpu and memory requests within limits",
            containers.len()
        )))
    } else {
        Ok(CheckVerdict::Fail(problems.join("; ")))
    }
}

fn container_problems(container: &Container, index: usize) -> Vec<String> {
    let who = container.display_name(index);
    let Some(resources) = container.resources.as_ref() else {
        return vec![format!("{who}: resources is missing")];
    };

    let mut problems = Vec::new();
    let requests = parse_section(&who, "requests", resources.requests.as_ref(), &mut problems);
    let limits = parse_section(&who, "limits", resources.limits.as_ref(), &mut problems);

    for name in RESOURCES {
        if let (Some(request), Some(limit)) = (requests.get(name), limits.get(name)) {
            if limit < request {
                problems.push(format!(
                    "{who}: resources.limits.{name} ({limit}) is below resources.requests.{name} ({request})"
                ));
            }
        }
    }
    problems
}

fn parse_section(
    who: &str,
    section: &str,
    values: Option<&BTreeMap<String, RawQuantity>>,
    problems: &mut Vec<String>,
) -> BTreeMap<&'static str, Quantity> {
    let mut parsed = BTreeMap::new();
    for name in RESOURCES {
        match values.and_then(|v| v.get(name)) {
            None => problems.push(format!("{who}: resources.{section}.{name} is missing")),
            Some(raw) => match Quantity::try_from(raw) {
                Ok(q) => {
                    parsed.insert(name, q);
                }
                Err(e) => problems.push(format!("{who}: resources.{section}.{name}: {e}")),
            },
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures;
    use crate::config::GradingConfig;

    fn run(yaml: &str) -> CheckVerdict {
        let submission = fixtures::submission(yaml);
        let config = GradingConfig::default();
        check(&CheckContext::new(&submission, &config))
    }

    #[test]
    fn test_complete_resources_pass() {
        assert!(run(fixtures::COMPLETE).is_pass());
    }

    #[test]
    fn test_missing_limits_names_fields() {
        let yaml = fixtures::COMPLETE.replace("          limits: {cpu: 500m, memory: 128Mi}\n", "");
        let verdict = run(&yaml);
        let CheckVerdict::Fail(evidence) = verdict else {
            panic!("expected failure, got {verdict:?}");
        };
        assert!(evidence.contains("container `app`: resources.limits.cpu is missing"));
        assert!(evidence.contains("resources.limits.memory is missing"));
    }

    #[test]
    fn test_limit_below_request() {
        let yaml = fixtures::COMPLETE.replace("limits: {cpu: 500m, memory: 128Mi}", "limits: {cpu: 50m, memory: 128Mi}");
        let verdict = run(&yaml);
        assert!(matches!(verdict, CheckVerdict::Fail(ref s) if s.contains("resources.limits.cpu (50m) is below")));
    }

    #[test]
    fn test_unparseable_quantity() {
        let yaml = fixtures::COMPLETE.replace("memory: 128Mi", "memory: lots");
        let verdict = run(&yaml);
        assert!(matches!(verdict, CheckVerdict::Fail(ref s) if s.contains("`lots` is not a valid resource quantity")));
    }

    #[test]
    fn test_numeric_cpu_accepted() {
        let yaml = fixtures::COMPLETE.replace("limits: {cpu: 500m", "limits: {cpu: 1");
        assert!(run(&yaml).is_pass());
    }

    #[test]
    fn test_no_resources_block() {
        let yaml = fixtures::COMPLETE
            .replace("        resources:\n", "")
            .replace("          requests: {cpu: 100m, memory: 64Mi}\n", "")
            .replace("          limits: {cpu: 500m, memory: 128Mi}\n", "");
        let verdict = run(&yaml);
        assert_eq!(verdict, CheckVerdict::Fail("container `app`: resources is missing".to_string()));
    }
}
