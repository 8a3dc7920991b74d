//! ServiceSelectorMatch: the Service selects the Deployment's pods.

use super::{settle, CheckContext};
use crate::domain::outcome::CheckVerdict;

pub fn check(ctx: &CheckContext<'_>) -> CheckVerdict {
    settle(evaluate(ctx))
}

fn evaluate(ctx: &CheckContext<'_>) -> Result<CheckVerdict, CheckVerdict> {
    let (svc_doc, service) = ctx.service()?;
    let (dep_doc, deployment) = ctx.deployment()?;

    let selector = service.spec.selector.unwrap_or_default();
    if selector.is_empty() {
        return Ok(CheckVerdict::Fail(format!(
            "Service `{}` has an empty selector and routes to no pods",
            svc_doc.name
        )));
    }

    let labels = &deployment.spec.template.metadata.labels;
    let mismatches: Vec<String> = selector
        .iter()
        .filter_map(|(key, want)| match labels.get(key) {
            None => Some(format!("`{key}` (selector wants {want}, pod template has no such label)")),
            Some(got) if got != want => Some(format!("`{key}` (selector wants {want}, pod template has {got})")),
            Some(_) => None,
        })
        .collect();

    if mismatches.is_empty() {
        let pairs: Vec<String> = selector.iter().map(|(k, v)| format!("{k}={v}")).collect();
        Ok(CheckVerdict::Pass(format!(
            "Service `{}` selector {} matches the pod template of Deployment `{}`",
            svc_doc.name,
            pairs.join(","),
            dep_doc.name
        )))
    } else {
        Ok(CheckVerdict::Fail(format!(
            "Service `{}` selector does not match Deployment `{}` pod labels: {}",
            svc_doc.name,
            dep_doc.name,
            mismatches.join(", ")
        )))
    }
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
    fn test_subset_selector_passes() {
        // Template carries an extra `tier` label the selector does not use.
        assert!(run(fixtures::COMPLETE).is_pass());
    }

    #[test]
    fn test_differing_value_cites_key() {
        let yaml = fixtures::COMPLETE
            .replace("  selector: {app: web}\n  ports:", "  selector: {app: foo}\n  ports:")
            .replace("labels: {app: web, tier: frontend}", "labels: {app: bar, tier: frontend}");
        let verdict = run(&yaml);
        let CheckVerdict::Fail(evidence) = verdict else {
            panic!("expected failure, got {verdict:?}");
        };
        assert!(evidence.contains("`app`"));
        assert!(evidence.contains("selector wants foo, pod template has bar"));
    }

    #[test]
    fn test_missing_label_cited() {
        let yaml = fixtures::COMPLETE.replace("  selector: {app: web}\n  ports:", "  selector: {app: web, track: stable}\n  ports:");
        let verdict = run(&yaml);
        assert!(matches!(verdict, CheckVerdict::Fail(ref s) if s.contains("`track`")));
    }

    #[test]
    fn test_empty_selector_fails() {
        let yaml = fixtures::COMPLETE.replace("  selector: {app: web}\n  ports:", "  selector: {}\n  ports:");
        let verdict = run(&yaml);
        assert!(matches!(verdict, CheckVerdict::Fail(ref s) if s.contains("empty selector")));
    }
}
