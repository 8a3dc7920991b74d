//! ServiceExposure: Service ports land on ports the containers expose, with
//! the configured port mapping and node ports.

use super::{settle, CheckContext};
use crate::domain::outcome::CheckVerdict;
use crate::domain::workload::{ContainerPort, IntOrString, ServicePort};

pub fn check(ctx: &CheckContext<'_>) -> CheckVerdict {
    settle(evaluate(ctx))
}

fn evaluate(ctx: &CheckContext<'_>) -> Result<CheckVerdict, CheckVerdict> {
    let (svc_doc, service) = ctx.service()?;
    let (dep_doc, deployment) = ctx.deployment()?;
    let mut problems = Vec::new();

    let service_type = service.spec.service_type.as_deref().unwrap_or("ClusterIP");
    if let Some(expected) = ctx.config.service_type.as_deref() {
        if service_type != expected {
            problems.push(format!(
                "Service `{}` has type {service_type}, expected {expected}",
                svc_doc.name
            ));
        }
    }

    if service.spec.ports.is_empty() {
        problems.push(format!("Service `{}` declares no ports", svc_doc.name));
    }

    let container_ports: Vec<_> = deployment
        .spec
        .template
        .spec
        .containers
        .iter()
        .flat_map(|c| c.ports.iter())
        .collect();

    for (i, port) in service.spec.ports.iter().enumerate() {
        let label = port_label(port, i);
        if ctx.config.require_node_port && port.node_port.is_none() {
            problems.push(format!("{label} does not set nodePort"));
        }
        let Some(target) = target_of(port) else {
            problems.push(format!("{label} has neither port nor targetPort"));
            continue;
        };
        let routed = container_ports.iter().any(|cp| match &target {
            IntOrString::Int(n) => cp.container_port == *n,
            IntOrString::Str(name) => cp.name.as_deref() == Some(name.as_str()),
        });
        if !routed {
            problems.push(format!(
                "{label} targets {target}, which no container in Deployment `{}` exposes",
                dep_doc.name
            ));
        }
    }

    if let Some(expected) = ctx.config.service_port {
        let expected = i64::from(expected);
        match service.spec.ports.iter().find(|p| p.port == Some(expected)) {
            None => problems.push(format!(
                "Service `{}` does not declare port {expected}",
                svc_doc.name
            )),
            Some(port) => {
                if let Some(want) = ctx.config.target_port.map(i64::from) {
                    let actual = target_of(port);
                    let resolved = actual.as_ref().and_then(|t| container_number(t, &container_ports));
                    if resolved != Some(want) {
                        let shown = actual.map(|t| t.to_string()).unwrap_or_else(|| "nothing".to_string());
                        problems.push(format!(
                            "Service port {expected} maps to {shown}, expected {expected} -> {want}"
                        ));
                    }
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(CheckVerdict::Pass(format!(
            "Service `{}` ({service_type}) routes {} port(s) to Deployment `{}`",
            svc_doc.name,
            service.spec.ports.len(),
            dep_doc.name
        )))
    } else {
        Ok(CheckVerdict::Fail(problems.join("; ")))
    }
}

/// `targetPort` defaults to `port`.
fn target_of(port: &ServicePort) -> Option<IntOrString> {
    port.target_port
        .clone()
        .or_else(|| port.port.map(IntOrString::Int))
}

/// Numeric container port a target resolves to; named targets go through
/// the container port names.
fn container_number(target: &IntOrString, container_ports: &[&ContainerPort]) -> Option<i64> {
    match target {
        IntOrString::Int(n) => Some(*n),
        IntOrString::Str(name) => container_ports
            .iter()
            .find(|cp| cp.name.as_deref() == Some(name.as_str()))
            .map(|cp| cp.container_port),
    }
}

fn port_label(port: &ServicePort, index: usize) -> String {
    match (&port.name, port.port) {
        (Some(name), _) => format!("Service port `{name}`"),
        (None, Some(n)) => format!("Service port {n}"),
        (None, None) => format!("Service port #{}", index + 1),
    }
}
