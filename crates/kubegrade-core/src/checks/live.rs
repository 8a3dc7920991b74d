//! LiveHealth: enough of the Deployment's pods report ready.
//!
//! Split in two: [`plan`] works out what to watch from the manifests, and
//! [`ready_pods`] judges one pod snapshot. Repeating the snapshot until it
//! passes is the poll engine's job.

use kubegrade_cluster::{LabelSelector, PodState, ResourceRef};

use super::CheckContext;
use crate::domain::outcome::CheckVerdict;

/// What the live check watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivePlan {
    pub deployment: ResourceRef,
    pub namespace: String,
    pub selector: LabelSelector,
    pub min_ready: u32,
}

/// Resolve the Deployment to watch; a verdict means there is nothing to poll.
pub fn plan(ctx: &CheckContext<'_>) -> Result<LivePlan, CheckVerdict> {
    let (doc, deployment) = ctx.deployment()?;
    let labels = deployment
        .spec
        .selector
        .map(|s| s.match_labels)
        .unwrap_or_default();
    if labels.is_empty() {
        return Err(CheckVerdict::Fail(format!(
            "Deployment `{}` has no selector.matchLabels, so its pods cannot be found",
            doc.name
        )));
    }

    Ok(LivePlan {
        deployment: doc.reference(),
        namespace: doc.namespace.clone(),
        selector: LabelSelector::new(labels),
        min_ready: ctx.config.min_ready_pods,
    })
}

/// Judge a single pod listing.
pub fn ready_pods(plan: &LivePlan, pods: &[PodState]) -> CheckVerdict {
    let matching: Vec<&PodState> = pods
        .iter()
        .filter(|p| p.namespace == plan.namespace && plan.selector.matches(&p.labels))
        .collect();
    let ready = matching.iter().filter(|p| p.is_serving()).count();
    let ready = u32::try_from(ready).unwrap_or(u32::MAX);

    if ready >= plan.min_ready {
        return CheckVerdict::Pass(format!(
            "{ready} of {} pod(s) matching {} are ready (needed {})",
            matching.len(),
            plan.selector,
            plan.min_ready
        ));
    }

    let waiting: Vec<String> = matching
        .iter()
        .filter(|p| !p.is_serving())
        .map(|p| {
            if p.terminating {
                format!("{} terminating", p.name)
            } else {
                format!("{} {}", p.name, p.phase)
            }
        })
        .collect();
    let detail = if waiting.is_empty() {
        String::new()
    } else {
        format!(" ({})", waiting.join(", "))
    };
    CheckVerdict::Fail(format!(
        "{ready} of {} pod(s) matching {} are ready, need {}{detail}",
        matching.len(),
        plan.selector,
        plan.min_ready
    ))
}
