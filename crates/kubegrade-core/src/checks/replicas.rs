//! ReplicaCount: the Deployment asks for enough replicas of the expected
//! image.

use super::{settle, CheckContext};
use crate::domain::outcome::CheckVerdict;

pub fn check(ctx: &CheckContext<'_>) -> CheckVerdict {
    settle(evaluate(ctx))
}

fn evaluate(ctx: &CheckContext<'_>) -> Result<CheckVerdict, CheckVerdict> {
    let (doc, deployment) = ctx.deployment()?;
    let min = i64::from(ctx.config.min_replicas);
    // The API server defaults an absent field to one replica.
    let (replicas, declared) = match deployment.spec.replicas {
        Some(n) => (n, true),
        None => (1, false),
    };

    let described = if declared {
        format!("spec.replicas is {replicas}")
    } else {
        "spec.replicas is not set (defaults to 1)".to_string()
    };

    let mut problems = Vec::new();
    if replicas < min {
        problems.push(format!(
            "Deployment `{}`: {described}, at least {min} required",
            doc.name
        ));
    }
    if let Some(expected) = ctx.config.expected_image.as_deref() {
        for (i, container) in deployment.spec.template.spec.containers.iter().enumerate() {
            match container.image.as_deref() {
                Some(image) if image.contains(expected) => {}
                Some(image) => problems.push(format!(
                    "{}: image is {image}, expected {expected}",
                    container.display_name(i)
                )),
                None => problems.push(format!("{}: image is not set", container.display_name(i))),
            }
        }
    }

    if problems.is_empty() {
        Ok(CheckVerdict::Pass(format!(
            "Deployment `{}`: {described}, at least {min} required",
            doc.name
        )))
    } else {
        Ok(CheckVerdict::Fail(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures;
    use crate::config::GradingConfig;

    fn run(yaml: &str, min_replicas: u32) -> CheckVerdict {
        let submission = fixtures::submission(yaml);
        let config = GradingConfig {
            min_replicas,
            ..GradingConfig::default()
        };
        check(&CheckContext::new(&submission, &config))
    }

    #[test]
    fn test_enough_replicas() {
        assert!(run(fixtures::COMPLETE, 2).is_pass());
    }

    #[test]
    fn test_too_few_replicas() {
        let verdict = run(fixtures::COMPLETE, 3);
        assert!(matches!(verdict, CheckVerdict::Fail(ref s) if s.contains("spec.replicas is 2")));
    }

    #[test]
    fn test_absent_replicas_counts_as_one() {
        let yaml = fixtures::COMPLETE.replace("  replicas: 2\n", "");
        let verdict = run(&yaml, 2);
        assert!(matches!(verdict, CheckVerdict::Fail(ref s) if s.contains("defaults to 1")));
        assert!(run(&yaml, 1).is_pass());
    }

    #[test]
    fn test_expected_image_substring() {
        let submission = fixtures::submission(fixtures::COMPLETE);
        let mut config = GradingConfig {
            expected_image: Some("web:1.0".to_string()),
            ..GradingConfig::default()
        };
        assert!(check(&CheckContext::new(&submission, &config)).is_pass());

        config.expected_image = Some("k8s-challenge-app".to_string());
        let verdict = check(&CheckContext::new(&submission, &config));
        assert_eq!(
            verdict,
            CheckVerdict::Fail(
                "container `app`: image is registry.local/web:1.0, expected k8s-challenge-app"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_missing_image_reported() {
        let yaml = fixtures::COMPLETE.replace("        image: registry.local/web:1.0\n", "");
        let submission = fixtures::submission(&yaml);
        let config = GradingConfig {
            expected_image: Some("web".to_string()),
            ..GradingConfig::default()
        };
        let verdict = check(&CheckContext::new(&submission, &config));
        assert!(matches!(verdict, CheckVerdict::Fail(ref s) if s.contains("image is not set")));
    }

    #[test]
    fn test_no_deployment() {
        let verdict = run("kind: Service\nmetadata: {name: web}\n", 2);
        assert_eq!(verdict, CheckVerdict::Fail("no Deployment in the submission".to_string()));
    }
}
